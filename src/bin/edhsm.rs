use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::io::{self, Read};
use std::path::PathBuf;
use tracing::error;

use edhsm::api::{
    KeyDetails, KeyId, KeySource, Pin, SignerConfig, UserType, DEFAULT_MODULE_LABEL,
    DEFAULT_MODULE_PATH, DEFAULT_SIGNING_MECHANISM,
};

#[derive(Parser, Debug)]
#[command(name = "edhsm")]
#[command(about = "Ed25519 signing on PKCS#11 tokens", version)]
pub struct Cli {
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Path to the PKCS#11 module
    #[arg(long, global = true, env = "EDHSM_MODULE", default_value = DEFAULT_MODULE_PATH)]
    pub module: PathBuf,

    /// Label used for the module in logs
    #[arg(long, global = true, default_value = DEFAULT_MODULE_LABEL)]
    pub module_label: String,

    /// Slot index in the module's slot list
    #[arg(long, global = true, default_value_t = 0)]
    pub slot: usize,

    /// User PIN
    #[arg(long, global = true, env = "EDHSM_PIN", default_value = "1234", hide_env_values = true)]
    pub pin: String,

    /// Login user type
    #[arg(long, global = true, default_value = "user")]
    pub user_type: UserTypeArg,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign data from stdin (or --message) and print the signature as hex
    Sign {
        /// Key id (CKA_ID) in hex
        #[arg(long, default_value = "0102030405")]
        key_id: String,

        /// Generate a fresh key pair instead of using the stored one
        #[arg(long)]
        generate: bool,

        /// Message to sign; stdin is read when absent
        #[arg(long)]
        message: Option<String>,

        /// Registry name of the signing mechanism
        #[arg(long, default_value = DEFAULT_SIGNING_MECHANISM)]
        mechanism: String,
    },

    /// Generate a new Ed25519 key pair and print the public key as hex
    Generate {
        /// Key id (CKA_ID) in hex
        #[arg(long, default_value = "0102030405")]
        key_id: String,
    },

    /// List slots
    Slots {
        /// Only slots holding a token
        #[arg(long)]
        with_token: bool,
    },

    /// Show the attributes of a stored key pair
    Info {
        /// Key id (CKA_ID) in hex
        #[arg(long, default_value = "0102030405")]
        key_id: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum UserTypeArg {
    User,
    So,
    ContextSpecific,
}

impl From<UserTypeArg> for UserType {
    fn from(arg: UserTypeArg) -> Self {
        match arg {
            UserTypeArg::User => UserType::User,
            UserTypeArg::So => UserType::SecurityOfficer,
            UserTypeArg::ContextSpecific => UserType::ContextSpecific,
        }
    }
}

impl Cli {
    fn config(&self, key_id: Option<&str>) -> anyhow::Result<SignerConfig> {
        let pin = Pin::from_str(&self.pin).map_err(|e| anyhow::anyhow!("Invalid PIN: {}", e))?;
        let key_id = match key_id {
            Some(hex_id) => KeyId::from_hex(hex_id)
                .map_err(|e| anyhow::anyhow!("Invalid key id: {}", e))?,
            None => KeyId::default(),
        };
        Ok(SignerConfig {
            module_path: self.module.clone(),
            module_label: self.module_label.clone(),
            slot_index: self.slot,
            pin,
            user_type: self.user_type.into(),
            key_id,
            ..SignerConfig::default()
        })
    }
}

fn print_key(details: &KeyDetails) {
    println!("{}:", details.class);
    if let Some(label) = &details.label {
        println!("  label:       {}", label);
    }
    if let Some(id) = &details.id {
        println!("  id:          {}", id);
    }
    if let Some(key_type) = details.key_type {
        println!("  key type:    {:#x}", key_type.0);
    }
    if let Some(curve) = details.curve {
        println!("  curve:       {:?}", curve);
    }
    let flags = [
        ("token", details.protection.token),
        ("private", details.protection.private),
        ("modifiable", details.protection.modifiable),
        ("sensitive", details.protection.sensitive),
        ("extractable", details.protection.extractable),
        ("sign", details.usage.sign),
        ("verify", details.usage.verify),
        ("encrypt", details.usage.encrypt),
        ("decrypt", details.usage.decrypt),
        ("derive", details.usage.derive),
    ];
    for (name, value) in flags {
        if let Some(value) = value {
            println!("  {:<12} {}", format!("{}:", name), value);
        }
    }
    if let Some(public_key) = details.public_key_hex() {
        println!("  public key:  {}", public_key);
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity.tracing_level_filter())
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Commands::Sign {
            key_id,
            generate,
            message,
            mechanism,
        } => {
            let mut config = cli.config(Some(key_id))?;
            config.mechanism = mechanism.clone();
            config.key_source = if *generate {
                KeySource::Generate
            } else {
                KeySource::Lookup
            };

            let data = match message {
                Some(message) => message.as_bytes().to_vec(),
                None => {
                    let mut buf = Vec::new();
                    io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };

            let report =
                edhsm::api::sign_payload(&config, &data).context("failed to sign payload")?;
            println!("{}", report.signature.to_hex());
            if !report.verified {
                error!("Signature did not verify with key {}", report.key_id);
                std::process::exit(1);
            }
        }
        Commands::Generate { key_id } => {
            let config = cli.config(Some(key_id))?;
            let generated =
                edhsm::api::generate_key(&config).context("failed to generate key pair")?;
            match generated.public_key {
                Some(public_key) => println!("{}", hex::encode(public_key)),
                None => {
                    error!("Token did not reveal the public key of {}", generated.key_id);
                    std::process::exit(1);
                }
            }
        }
        Commands::Slots { with_token } => {
            let config = cli.config(None)?;
            let slots =
                edhsm::api::list_slots(&config, *with_token).context("failed to list slots")?;
            for slot in slots {
                println!("{}", slot);
            }
        }
        Commands::Info { key_id } => {
            let config = cli.config(Some(key_id))?;
            let details = edhsm::api::inspect_key(&config).context("failed to read key pair")?;
            print_key(&details.public);
            print_key(&details.private);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_cmd::Command;

    #[test]
    fn test_cli_version_parameter() {
        let mut cmd = Command::cargo_bin("edhsm").unwrap();
        let assert = cmd.arg("--version").assert();
        assert.success();
    }

    #[test]
    fn test_cli_rejects_bad_key_id() {
        let mut cmd = Command::cargo_bin("edhsm").unwrap();
        let assert = cmd
            .arg("sign")
            .arg("--key-id")
            .arg("not-hex")
            .arg("--message")
            .arg("helloworld")
            .assert();
        let output = assert.failure().get_output().clone();
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("Invalid key id"), "stderr: {}", stderr);
    }

    #[test]
    fn test_cli_missing_module() {
        let mut cmd = Command::cargo_bin("edhsm").unwrap();
        let assert = cmd
            .arg("--module")
            .arg("/nonexistent/libpkcs11.so")
            .arg("slots")
            .assert();
        let output = assert.failure().get_output().clone();
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("failed to list slots"), "stderr: {}", stderr);
    }

    #[test]
    #[cfg_attr(not(feature = "hardware-tests"), ignore)] // Requires a PKCS#11 module - enable with: --features hardware-tests
    fn test_cli_sign_with_generated_key() {
        let mut cmd = Command::cargo_bin("edhsm").unwrap();
        let assert = cmd
            .arg("sign")
            .arg("--generate")
            .arg("--key-id")
            .arg("c0ffee01")
            .arg("--message")
            .arg("helloworld")
            .assert();

        let output = assert.success().get_output().clone();
        let stdout = String::from_utf8_lossy(&output.stdout);
        let trimmed = stdout.trim();
        assert_eq!(trimmed.len(), 128, "Signature should be 128 hex characters (64 bytes)");
        assert!(
            trimmed.chars().all(|c| c.is_ascii_hexdigit()),
            "Output should be valid hex"
        );
    }

    #[test]
    #[cfg_attr(not(feature = "hardware-tests"), ignore)] // Requires a PKCS#11 module - enable with: --features hardware-tests
    fn test_cli_generate_prints_public_key() {
        let mut cmd = Command::cargo_bin("edhsm").unwrap();
        let assert = cmd.arg("generate").arg("--key-id").arg("c0ffee02").assert();

        let output = assert.success().get_output().clone();
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert_eq!(
            stdout.trim().len(),
            64,
            "Public key should be 64 hex characters (32 bytes)"
        );
    }

    #[test]
    #[cfg_attr(not(feature = "hardware-tests"), ignore)] // Requires a PKCS#11 module - enable with: --features hardware-tests
    fn test_cli_slots_with_token() {
        let mut cmd = Command::cargo_bin("edhsm").unwrap();
        let assert = cmd.arg("slots").arg("--with-token").assert();

        let output = assert.success().get_output().clone();
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("token=present"), "stdout: {}", stdout);
    }
}
