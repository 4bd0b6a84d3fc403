//! Device certificate minting
//!
//! Each provisioned sensor gets its own keypair and a client-auth
//! certificate with the sensor id as Common Name; the broker matches the
//! CN against the connecting client id.

use super::types::MintedCertificate;
use crate::error::{Error, Result};
use rcgen::{CertificateParams, DnType, ExtendedKeyUsagePurpose, KeyPair, KeyUsagePurpose};

/// Mint a keypair and self-signed client certificate for a sensor.
///
/// The private key is returned in this value only; it is never persisted
/// and never reloadable.
pub fn mint_device_certificate(sensor_id: &str) -> Result<MintedCertificate> {
    let mut params = CertificateParams::default();
    params
        .distinguished_name
        .push(DnType::CommonName, sensor_id);
    params
        .distinguished_name
        .push(DnType::OrganizationName, "sensortune");
    params.key_usages.push(KeyUsagePurpose::DigitalSignature);
    params
        .extended_key_usages
        .push(ExtendedKeyUsagePurpose::ClientAuth);

    let key_pair =
        KeyPair::generate().map_err(|e| Error::Internal(format!("keypair generation: {e}")))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| Error::Internal(format!("certificate signing: {e}")))?;

    Ok(MintedCertificate {
        certificate_pem: cert.pem(),
        private_key_pem: key_pair.serialize_pem(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_material_is_pem() {
        let minted = mint_device_certificate("bedroom-01").unwrap();
        assert!(minted.certificate_pem.contains("BEGIN CERTIFICATE"));
        assert!(minted.private_key_pem.contains("BEGIN PRIVATE KEY"));
    }

    #[test]
    fn each_mint_is_unique() {
        let a = mint_device_certificate("bedroom-01").unwrap();
        let b = mint_device_certificate("bedroom-01").unwrap();
        assert_ne!(a.private_key_pem, b.private_key_pem);
    }
}
