//! Prints the certificate chain presented by a TLS endpoint.
//!
//! ```text
//! cargo run --example details -- example.com:443 [--insecure] [--pem]
//! ```

use std::env;
use std::io;

use ssltool::chain::{self, RetrieveOptions};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().compact().with_writer(io::stderr))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let address = args
        .iter()
        .find(|arg| !arg.starts_with("--"))
        .cloned()
        .unwrap_or_else(|| "example.com:443".to_string());
    let insecure = args.iter().any(|arg| arg == "--insecure");
    let show_pem = args.iter().any(|arg| arg == "--pem");

    let options = RetrieveOptions::builder().verify_peer(!insecure).build();
    for detail in chain::retrieve(&address, &options)? {
        print!("{detail}");
        if show_pem {
            print!("{}", chain::encode_to_pem(&detail)?);
        }
        println!();
    }
    Ok(())
}
