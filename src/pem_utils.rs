use crate::error::{Result, SslToolError};

/// Convert DER‑encoded data into a PEM‑encoded string with the provided label.
///
/// Lines are wrapped at 64 columns and terminated with `\n`.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let pem = pem::Pem::new(label, der);
    pem::encode_config(
        &pem,
        pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
    )
}

/// Parse the first PEM block in `pem_str`.
pub fn parse_block(pem_str: &str) -> Result<pem::Pem> {
    pem::parse(pem_str).map_err(|e| SslToolError::DecodingError(e.to_string()))
}

/// Parse the first PEM block in `pem_str`, requiring one of the `expected` labels, and return its
/// DER contents.
pub fn pem_to_der(pem_str: &str, expected: &[&str]) -> Result<Vec<u8>> {
    let block = parse_block(pem_str)?;
    if !expected.contains(&block.tag()) {
        return Err(SslToolError::DecodingError(format!(
            "unexpected PEM block type {:?}, expected one of {:?}",
            block.tag(),
            expected
        )));
    }
    Ok(block.into_contents())
}
