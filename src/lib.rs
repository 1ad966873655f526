//! Ed25519 key provisioning and signing on PKCS#11 tokens
//!
//! The crate drives a PKCS#11 module (SoftHSM2 or a hardware HSM) through
//! one run: load the module, register the Edwards mechanisms, pick a slot,
//! log in, find or generate a key pair, sign and self-verify, log out,
//! close and finalize.
//!
//! ```no_run
//! use edhsm::{api, KeySource, SignerConfig};
//!
//! let config = SignerConfig {
//!     key_source: KeySource::Generate,
//!     ..SignerConfig::default()
//! };
//! let report = api::sign_payload(&config, b"helloworld")?;
//! assert!(report.verified);
//! # Ok::<(), edhsm::EdhsmError>(())
//! ```

pub mod adapters;
pub mod api;
pub mod device;
pub mod error;
pub mod model;
pub mod ports;
pub mod provisioner;
pub mod registry;
pub mod session;
pub mod signing;
pub mod use_cases;

// Re-export commonly used types
pub use device::Device;
pub use error::{EdhsmError, EdhsmResult};
pub use model::{KeyId, KeySource, Pin, SignerConfig, Signature, SlotInfo, UserType};
pub use registry::MechanismRegistry;
pub use session::{AuthenticatedSession, Session};
pub use use_cases::{SignRequest, SigningReport};
