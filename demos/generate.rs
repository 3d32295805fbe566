//! Generates a CSR and private key.
//!
//! ```text
//! cargo run --example generate -- <rsa|ecdsa|ecdsa-p384|ed25519> <common-name> [san...]
//! ```
//!
//! Set `SSLTOOL_PASSPHRASE` to encrypt the emitted key.

use std::env;
use std::io;

use ssltool::csr::{self, CsrOptions, SubjectDescriptor};
use ssltool::key::KeyAlgorithm;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().compact().with_writer(io::stderr))
        .init();

    let mut args = env::args().skip(1);
    let algorithm: KeyAlgorithm = args.next().as_deref().unwrap_or("rsa").parse()?;
    let common_name = args.next().unwrap_or_default();
    let sans: Vec<String> = args.collect();

    let subject = SubjectDescriptor::builder().common_name(common_name).build();
    let options = match env::var("SSLTOOL_PASSPHRASE") {
        Ok(passphrase) => CsrOptions::builder().encrypt(true).passphrase(passphrase).build(),
        Err(_) => CsrOptions::default(),
    };

    let result = csr::generate_secure(&subject, &sans, algorithm, &options)?;
    println!("{}", result.csr_pem);
    println!("{}", result.private_key_pem);
    Ok(())
}
