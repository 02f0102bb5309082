use rcgen::{PublicKeyData, SignatureAlgorithm};
use x509_parser::oid_registry::{
	OID_EC_P256, OID_KEY_TYPE_EC_PUBLIC_KEY, OID_NIST_EC_P384, OID_PKCS1_RSAENCRYPTION,
	OID_SIG_ED25519,
};
use x509_parser::prelude::FromDer;
use x509_parser::x509::SubjectPublicKeyInfo;

use crate::{Error, Result};

/// A public key taken from a SubjectPublicKeyInfo, usable as the subject key
/// of an issued certificate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubjectKey {
	raw: Vec<u8>,
	alg: &'static SignatureAlgorithm,
}

impl SubjectKey {
	/// Parse a DER encoded SubjectPublicKeyInfo.
	pub fn from_spki_der(spki: &[u8]) -> Result<Self> {
		let (_, spki) = SubjectPublicKeyInfo::from_der(spki)
			.map_err(|e| Error::UnsupportedAlgorithm(format!("malformed public key: {e}")))?;
		Self::from_spki(&spki)
	}

	pub(crate) fn from_spki(spki: &SubjectPublicKeyInfo<'_>) -> Result<Self> {
		let key_oid = &spki.algorithm.algorithm;
		let alg = if *key_oid == OID_KEY_TYPE_EC_PUBLIC_KEY {
			let curve = spki
				.algorithm
				.parameters
				.as_ref()
				.and_then(|p| p.as_oid().ok())
				.ok_or_else(|| Error::UnsupportedAlgorithm("EC key without named curve".into()))?;
			if curve == OID_EC_P256 {
				&rcgen::PKCS_ECDSA_P256_SHA256
			} else if curve == OID_NIST_EC_P384 {
				&rcgen::PKCS_ECDSA_P384_SHA384
			} else {
				return Err(Error::UnsupportedAlgorithm(format!("EC curve {curve}")));
			}
		} else if *key_oid == OID_SIG_ED25519 {
			&rcgen::PKCS_ED25519
		} else if *key_oid == OID_PKCS1_RSAENCRYPTION {
			&rcgen::PKCS_RSA_SHA256
		} else {
			return Err(Error::UnsupportedAlgorithm(format!("key type {key_oid}")));
		};

		Ok(Self {
			raw: spki.subject_public_key.data.to_vec(),
			alg,
		})
	}

	/// The subject public key bits, without the algorithm identifier.
	pub fn raw(&self) -> &[u8] {
		&self.raw
	}
}

impl PublicKeyData for SubjectKey {
	fn der_bytes(&self) -> &[u8] {
		&self.raw
	}

	fn algorithm(&self) -> &'static SignatureAlgorithm {
		self.alg
	}
}
