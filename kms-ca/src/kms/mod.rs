//! The boundary to the key-management service that holds the CA key.
//!
//! Issuance only needs two things from a KMS: the public half of a key
//! version and a signature over a message. [`KeyManagementService`] captures
//! exactly that, so the Cloud KMS REST backend and the in-process
//! [`LocalKms`] are interchangeable.

use std::{fmt, str::FromStr};

use ring::digest;

use crate::{Error, Result};

#[cfg(feature = "cloudkms")]
mod cloud;
#[cfg(feature = "cloudkms")]
pub use cloud::{CloudKms, CloudKmsConfig, DEFAULT_ENDPOINT};

mod local;
pub use local::LocalKms;

/// A remote service able to sign with a key it never reveals.
pub trait KeyManagementService {
	/// Fetch the public key and signing algorithm of a key version.
	fn public_key(&self, key: &KeyVersionName) -> Result<RemotePublicKey>;

	/// Sign `message` with the key version.
	///
	/// Implementations hash `message` with [`KmsAlgorithm::digest`] when the
	/// algorithm has one, and return the signature in the encoding X.509
	/// expects for `algorithm`.
	fn asymmetric_sign(
		&self,
		key: &KeyVersionName,
		algorithm: KmsAlgorithm,
		message: &[u8],
	) -> Result<Vec<u8>>;
}

impl<T: KeyManagementService + ?Sized> KeyManagementService for &T {
	fn public_key(&self, key: &KeyVersionName) -> Result<RemotePublicKey> {
		(**self).public_key(key)
	}

	fn asymmetric_sign(
		&self,
		key: &KeyVersionName,
		algorithm: KmsAlgorithm,
		message: &[u8],
	) -> Result<Vec<u8>> {
		(**self).asymmetric_sign(key, algorithm, message)
	}
}

/// The public half of a KMS key version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemotePublicKey {
	/// Algorithm the key version signs with.
	pub algorithm: KmsAlgorithm,
	/// DER encoded SubjectPublicKeyInfo.
	pub spki_der: Vec<u8>,
}

/// Fully qualified name of a KMS key version:
/// `projects/{project}/locations/{location}/keyRings/{ring}/cryptoKeys/{key}/cryptoKeyVersions/{version}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyVersionName(String);

const KEY_VERSION_LABELS: [&str; 5] = [
	"projects",
	"locations",
	"keyRings",
	"cryptoKeys",
	"cryptoKeyVersions",
];

impl KeyVersionName {
	/// The name as sent to the KMS.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// The `cryptoKeyVersions` component.
	pub fn version(&self) -> &str {
		self.0.rsplit('/').next().unwrap_or_default()
	}
}

impl FromStr for KeyVersionName {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		let segments = s.split('/').collect::<Vec<_>>();
		if segments.len() != KEY_VERSION_LABELS.len() * 2 {
			return Err(Error::InvalidKeyName(s.to_owned()));
		}
		for (pair, label) in segments.chunks(2).zip(KEY_VERSION_LABELS) {
			let valid_id = !pair[1].is_empty()
				&& pair[1]
					.chars()
					.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
			if pair[0] != label || !valid_id {
				return Err(Error::InvalidKeyName(s.to_owned()));
			}
		}
		Ok(Self(s.to_owned()))
	}
}

impl fmt::Display for KeyVersionName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Asymmetric signing algorithms a KMS key version may report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KmsAlgorithm {
	/// ECDSA on P-256 over a SHA-256 digest.
	EcSignP256Sha256,
	/// ECDSA on P-384 over a SHA-384 digest.
	EcSignP384Sha384,
	/// Pure Ed25519; the KMS receives the whole message.
	EcSignEd25519,
	/// RSASSA-PKCS1-v1_5, 2048 bit key, SHA-256.
	RsaSignPkcs1_2048Sha256,
	/// RSASSA-PKCS1-v1_5, 3072 bit key, SHA-256.
	RsaSignPkcs1_3072Sha256,
	/// RSASSA-PKCS1-v1_5, 4096 bit key, SHA-256.
	RsaSignPkcs1_4096Sha256,
	/// RSASSA-PKCS1-v1_5, 4096 bit key, SHA-512.
	RsaSignPkcs1_4096Sha512,
}

impl KmsAlgorithm {
	const ALL: [KmsAlgorithm; 7] = [
		KmsAlgorithm::EcSignP256Sha256,
		KmsAlgorithm::EcSignP384Sha384,
		KmsAlgorithm::EcSignEd25519,
		KmsAlgorithm::RsaSignPkcs1_2048Sha256,
		KmsAlgorithm::RsaSignPkcs1_3072Sha256,
		KmsAlgorithm::RsaSignPkcs1_4096Sha256,
		KmsAlgorithm::RsaSignPkcs1_4096Sha512,
	];

	/// The algorithm name used by the Cloud KMS API.
	pub fn as_str(&self) -> &'static str {
		match self {
			KmsAlgorithm::EcSignP256Sha256 => "EC_SIGN_P256_SHA256",
			KmsAlgorithm::EcSignP384Sha384 => "EC_SIGN_P384_SHA384",
			KmsAlgorithm::EcSignEd25519 => "EC_SIGN_ED25519",
			KmsAlgorithm::RsaSignPkcs1_2048Sha256 => "RSA_SIGN_PKCS1_2048_SHA256",
			KmsAlgorithm::RsaSignPkcs1_3072Sha256 => "RSA_SIGN_PKCS1_3072_SHA256",
			KmsAlgorithm::RsaSignPkcs1_4096Sha256 => "RSA_SIGN_PKCS1_4096_SHA256",
			KmsAlgorithm::RsaSignPkcs1_4096Sha512 => "RSA_SIGN_PKCS1_4096_SHA512",
		}
	}

	/// The X.509 signature algorithm of certificates signed with this key.
	pub fn signature_algorithm(&self) -> &'static rcgen::SignatureAlgorithm {
		match self {
			KmsAlgorithm::EcSignP256Sha256 => &rcgen::PKCS_ECDSA_P256_SHA256,
			KmsAlgorithm::EcSignP384Sha384 => &rcgen::PKCS_ECDSA_P384_SHA384,
			KmsAlgorithm::EcSignEd25519 => &rcgen::PKCS_ED25519,
			KmsAlgorithm::RsaSignPkcs1_2048Sha256
			| KmsAlgorithm::RsaSignPkcs1_3072Sha256
			| KmsAlgorithm::RsaSignPkcs1_4096Sha256 => &rcgen::PKCS_RSA_SHA256,
			KmsAlgorithm::RsaSignPkcs1_4096Sha512 => &rcgen::PKCS_RSA_SHA512,
		}
	}

	/// The digest the KMS signs over, `None` when it signs the message itself.
	pub fn digest(&self) -> Option<&'static digest::Algorithm> {
		match self {
			KmsAlgorithm::EcSignP256Sha256
			| KmsAlgorithm::RsaSignPkcs1_2048Sha256
			| KmsAlgorithm::RsaSignPkcs1_3072Sha256
			| KmsAlgorithm::RsaSignPkcs1_4096Sha256 => Some(&digest::SHA256),
			KmsAlgorithm::EcSignP384Sha384 => Some(&digest::SHA384),
			KmsAlgorithm::RsaSignPkcs1_4096Sha512 => Some(&digest::SHA512),
			KmsAlgorithm::EcSignEd25519 => None,
		}
	}

	/// The KMS algorithm matching an rcgen signature algorithm, if any.
	///
	/// RSA keys map to the 2048 bit variant of their digest.
	pub fn from_signature_algorithm(alg: &rcgen::SignatureAlgorithm) -> Option<Self> {
		Self::ALL
			.into_iter()
			.find(|candidate| candidate.signature_algorithm() == alg)
	}
}

impl FromStr for KmsAlgorithm {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		Self::ALL
			.into_iter()
			.find(|alg| alg.as_str() == s)
			.ok_or_else(|| Error::UnsupportedAlgorithm(s.to_owned()))
	}
}

impl fmt::Display for KmsAlgorithm {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
