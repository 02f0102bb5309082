use std::collections::HashMap;

use rcgen::{KeyPair, PublicKeyData, SignatureAlgorithm, SigningKey};

use super::{KeyManagementService, KeyVersionName, KmsAlgorithm, RemotePublicKey};
use crate::{Error, Result};

/// Software keys held in process memory, answering like a KMS.
///
/// Useful for tests and for offline ceremonies where the CA key is a
/// PKCS#8 file rather than a cloud key.
#[derive(Default)]
pub struct LocalKms {
	keys: HashMap<KeyVersionName, KeyPair>,
}

impl LocalKms {
	/// An empty key store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Store `key_pair` under `name`, replacing any previous key.
	pub fn insert(&mut self, name: KeyVersionName, key_pair: KeyPair) -> Result<()> {
		KmsAlgorithm::from_signature_algorithm(key_pair.algorithm()).ok_or_else(|| {
			Error::UnsupportedAlgorithm(format!("{:?}", key_pair.algorithm()))
		})?;
		self.keys.insert(name, key_pair);
		Ok(())
	}

	/// Store a PEM encoded private key under `name`.
	pub fn load_pem(&mut self, name: KeyVersionName, pem: &str) -> Result<()> {
		let key_pair = KeyPair::from_pem(pem)?;
		self.insert(name, key_pair)
	}

	/// Generate a fresh key for `alg` and store it under `name`.
	pub fn generate(
		&mut self,
		name: KeyVersionName,
		alg: &'static SignatureAlgorithm,
	) -> Result<&KeyPair> {
		let key_pair = KeyPair::generate_for(alg)?;
		self.insert(name.clone(), key_pair)?;
		Ok(&self.keys[&name])
	}

	/// The key stored under `name`.
	pub fn key_pair(&self, name: &KeyVersionName) -> Option<&KeyPair> {
		self.keys.get(name)
	}

	fn lookup(&self, name: &KeyVersionName) -> Result<&KeyPair> {
		self.keys.get(name).ok_or_else(|| Error::KmsStatus {
			status: 404,
			message: format!("{name} not found"),
		})
	}
}

impl KeyManagementService for LocalKms {
	fn public_key(&self, key: &KeyVersionName) -> Result<RemotePublicKey> {
		let key_pair = self.lookup(key)?;
		let algorithm = KmsAlgorithm::from_signature_algorithm(key_pair.algorithm())
			.ok_or_else(|| Error::UnsupportedAlgorithm(format!("{:?}", key_pair.algorithm())))?;
		Ok(RemotePublicKey {
			algorithm,
			spki_der: key_pair.subject_public_key_info(),
		})
	}

	fn asymmetric_sign(
		&self,
		key: &KeyVersionName,
		algorithm: KmsAlgorithm,
		message: &[u8],
	) -> Result<Vec<u8>> {
		let key_pair = self.lookup(key)?;
		if key_pair.algorithm() != algorithm.signature_algorithm() {
			return Err(Error::KmsStatus {
				status: 400,
				message: format!("{key} does not support {algorithm}"),
			});
		}
		tracing::debug!(%key, %algorithm, "signing with local key");
		Ok(key_pair.sign(message)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ring::signature::{self, UnparsedPublicKey};

	fn name(version: u32) -> KeyVersionName {
		format!("projects/p/locations/global/keyRings/r/cryptoKeys/k/cryptoKeyVersions/{version}")
			.parse()
			.unwrap()
	}

	#[test]
	fn public_key_matches_stored_key() {
		let mut kms = LocalKms::new();
		let spki = kms
			.generate(name(1), &rcgen::PKCS_ECDSA_P256_SHA256)
			.unwrap()
			.subject_public_key_info();
		let remote = kms.public_key(&name(1)).unwrap();
		assert_eq!(remote.algorithm, KmsAlgorithm::EcSignP256Sha256);
		assert_eq!(remote.spki_der, spki);
	}

	#[test]
	fn signatures_verify() {
		let mut kms = LocalKms::new();
		let raw = kms
			.generate(name(1), &rcgen::PKCS_ECDSA_P256_SHA256)
			.unwrap()
			.der_bytes()
			.to_vec();
		let sig = kms
			.asymmetric_sign(&name(1), KmsAlgorithm::EcSignP256Sha256, b"tbs")
			.unwrap();
		UnparsedPublicKey::new(&signature::ECDSA_P256_SHA256_ASN1, raw)
			.verify(b"tbs", &sig)
			.unwrap();
	}

	#[test]
	fn unknown_key() {
		let kms = LocalKms::new();
		assert!(matches!(
			kms.public_key(&name(7)),
			Err(Error::KmsStatus { status: 404, .. })
		));
	}

	#[test]
	fn algorithm_mismatch() {
		let mut kms = LocalKms::new();
		kms.generate(name(1), &rcgen::PKCS_ED25519).unwrap();
		assert!(matches!(
			kms.asymmetric_sign(&name(1), KmsAlgorithm::EcSignP256Sha256, b"tbs"),
			Err(Error::KmsStatus { status: 400, .. })
		));
	}

	#[test]
	fn load_pem() {
		let key_pair = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384).unwrap();
		let mut kms = LocalKms::new();
		kms.load_pem(name(2), &key_pair.serialize_pem()).unwrap();
		assert_eq!(
			kms.public_key(&name(2)).unwrap().algorithm,
			KmsAlgorithm::EcSignP384Sha384
		);
	}
}
