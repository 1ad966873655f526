#[macro_export]
macro_rules! contract_tests_for {
      (
          $mod_name:ident,
          make = $make:expr,
          pin = $pin:expr,
          tests = {
            $( $test_name:ident => $tmpl:path ),+ $(,)?
        }
      ) => {
          mod $mod_name {
              use super::*;

              $(
                  #[test]
                  #[allow(clippy::redundant_closure_call)]
                  fn $test_name() {
                      let provider = ($make)();
                      $tmpl(provider, $pin);
                  }
              )+
          }
      };
      (
          $mod_name:ident,
          hardware,
          make = $make:expr,
          pin = $pin:expr,
          tests = {
            $( $test_name:ident => $tmpl:path ),+ $(,)?
        }
      ) => {
          mod $mod_name {
              use super::*;

              $(
                  #[test]
                  #[cfg_attr(not(feature = "hardware-tests"), ignore)] // Requires a PKCS#11 module - enable with: --features hardware-tests
                  #[allow(clippy::redundant_closure_call)]
                  fn $test_name() {
                      let provider = ($make)();
                      $tmpl(provider, $pin);
                  }
              )+
          }
      };
  }

#[cfg(test)]
pub mod token_contract {
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};

    use crate::{
        error::{KeyManagementError, SessionError},
        model::{
            decode_ec_point, AttributeKind, AttributeRead, AttributeValue, KeyId,
            KeyPairTemplate, KeyTypeId, MechanismId, ObjectClass, Pin, SessionMode, SlotInfo,
            UserType,
        },
        ports::{Provider, TokenSession},
        EdhsmError,
    };

    /// Keys made by the contract use their own id so a real token's
    /// existing objects are never matched.
    fn contract_key_id() -> KeyId {
        KeyId::from_slice(&[0xc0, 0x47, 0x7a, 0xc7]).unwrap()
    }

    fn first_token_slot(provider: &impl Provider) -> SlotInfo {
        provider
            .slots(true)
            .unwrap()
            .into_iter()
            .next()
            .expect("no slot with a token")
    }

    fn logged_in<P: Provider>(provider: &P, pin: &Pin) -> P::Session {
        let slot = first_token_slot(provider);
        let mut session = provider
            .open_session(&slot, SessionMode::read_write())
            .unwrap();
        session.login(UserType::User, pin).unwrap();
        session
    }

    fn finish(mut session: impl TokenSession) {
        session.logout().unwrap();
        session.close().unwrap();
    }

    pub(crate) fn test_initialize_and_finalize(mut provider: impl Provider, _pin: Pin) {
        provider.initialize().unwrap();
        provider.finalize().unwrap();
    }

    pub(crate) fn test_slots_report_token(mut provider: impl Provider, _pin: Pin) {
        provider.initialize().unwrap();
        let slots = provider.slots(true).unwrap();
        assert!(!slots.is_empty());
        assert!(slots.iter().all(|slot| slot.token_present));
        assert!(provider.slots(false).unwrap().len() >= slots.len());
        provider.finalize().unwrap();
    }

    pub(crate) fn test_login_wrong_pin(mut provider: impl Provider, _pin: Pin) {
        provider.initialize().unwrap();
        let slot = first_token_slot(&provider);
        let mut session = provider
            .open_session(&slot, SessionMode::read_write())
            .unwrap();

        let wrong_pin = Pin::from_str("wrong-pin-0000").unwrap();
        assert!(matches!(
            session.login(UserType::User, &wrong_pin).unwrap_err(),
            EdhsmError::Session(SessionError::Authentication { .. })
        ));

        session.close().unwrap();
        provider.finalize().unwrap();
    }

    pub(crate) fn test_login_twice(mut provider: impl Provider, pin: Pin) {
        provider.initialize().unwrap();
        let mut session = logged_in(&provider, &pin);
        assert!(matches!(
            session.login(UserType::User, &pin).unwrap_err(),
            EdhsmError::Session(SessionError::AlreadyLoggedIn)
        ));
        finish(session);
        provider.finalize().unwrap();
    }

    pub(crate) fn test_find_missing_objects(mut provider: impl Provider, pin: Pin) {
        provider.initialize().unwrap();
        let session = logged_in(&provider, &pin);
        let missing = KeyId::from_slice(&[0xde, 0xad, 0x00, 0x01]).unwrap();
        assert!(session
            .find_objects(ObjectClass::PrivateKey, &missing)
            .unwrap()
            .is_empty());
        finish(session);
        provider.finalize().unwrap();
    }

    pub(crate) fn test_generate_find_sign_verify(mut provider: impl Provider, pin: Pin) {
        provider.initialize().unwrap();
        let mut session = logged_in(&provider, &pin);
        let template = KeyPairTemplate::edwards(contract_key_id());

        let (public, private) = session
            .generate_key_pair(MechanismId::EC_EDWARDS_KEY_PAIR_GEN, &template)
            .unwrap();
        let found = session
            .find_objects(ObjectClass::PrivateKey, &contract_key_id())
            .unwrap();
        assert!(found.contains(&private));

        let message = b"contract message";
        let signature = session.sign(MechanismId::EDDSA, private, message).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(session
            .verify(MechanismId::EDDSA, public, message, &signature)
            .unwrap());

        // The signature must also check out off-device against CKA_EC_POINT.
        let point = session
            .read_attribute(public, AttributeKind::EcPoint)
            .unwrap()
            .bytes()
            .expect("public key without CKA_EC_POINT");
        let public_key = decode_ec_point(&point).expect("malformed CKA_EC_POINT");
        let verifying_key = VerifyingKey::from_bytes(&public_key).unwrap();
        let signature = Signature::from_slice(&signature).unwrap();
        verifying_key.verify(message, &signature).unwrap();

        finish(session);
        provider.finalize().unwrap();
    }

    pub(crate) fn test_generate_rejects_wrong_mechanism(mut provider: impl Provider, pin: Pin) {
        provider.initialize().unwrap();
        let mut session = logged_in(&provider, &pin);
        let template = KeyPairTemplate::edwards(contract_key_id());

        // CKM_EC_KEY_PAIR_GEN
        let result = session.generate_key_pair(MechanismId(0x1040), &template);
        assert!(matches!(
            result.unwrap_err(),
            EdhsmError::KeyManagement(KeyManagementError::Generation { .. })
        ));

        finish(session);
        provider.finalize().unwrap();
    }

    pub(crate) fn test_verify_mismatch_is_false(mut provider: impl Provider, pin: Pin) {
        provider.initialize().unwrap();
        let mut session = logged_in(&provider, &pin);
        let template = KeyPairTemplate::edwards(contract_key_id());
        let (public, private) = session
            .generate_key_pair(MechanismId::EC_EDWARDS_KEY_PAIR_GEN, &template)
            .unwrap();

        let mut signature = session.sign(MechanismId::EDDSA, private, b"one").unwrap();
        assert!(!session
            .verify(MechanismId::EDDSA, public, b"two", &signature)
            .unwrap());

        signature[0] ^= 0xff;
        assert!(!session
            .verify(MechanismId::EDDSA, public, b"one", &signature)
            .unwrap());

        finish(session);
        provider.finalize().unwrap();
    }

    pub(crate) fn test_read_public_attributes(mut provider: impl Provider, pin: Pin) {
        provider.initialize().unwrap();
        let mut session = logged_in(&provider, &pin);
        let template = KeyPairTemplate::edwards(contract_key_id());
        let (public, _) = session
            .generate_key_pair(MechanismId::EC_EDWARDS_KEY_PAIR_GEN, &template)
            .unwrap();

        assert_eq!(
            session.read_attribute(public, AttributeKind::KeyType).unwrap(),
            AttributeRead::Value(AttributeValue::KeyType(KeyTypeId::EC_EDWARDS))
        );
        assert_eq!(
            session.read_attribute(public, AttributeKind::Id).unwrap(),
            AttributeRead::Value(AttributeValue::Bytes(contract_key_id().as_bytes().to_vec()))
        );
        assert_eq!(
            session.read_attribute(public, AttributeKind::Verify).unwrap(),
            AttributeRead::Value(AttributeValue::Bool(true))
        );

        finish(session);
        provider.finalize().unwrap();
    }
}
