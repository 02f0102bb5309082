use std::cell::RefCell;

use pki_types::CertificateDer;
use rcgen::{CertificateParams, CustomExtension, Issuer, PublicKeyData, SigningKey};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::key::SubjectKey;
use crate::kms::{KeyManagementService, KeyVersionName, KmsAlgorithm};
use crate::{Error, Result};

/// Netscape certificate comment, `2.16.840.1.113730.1.13`.
const OID_NETSCAPE_COMMENT: &[u64] = &[2, 16, 840, 1, 113730, 1, 13];

/// A signer bound to a KMS key version and the CA certificate of that key.
pub struct KmsSigner<K> {
	kms: K,
	key: KeyVersionName,
	algorithm: KmsAlgorithm,
	public_key: SubjectKey,
	parent: CertificateDer<'static>,
}

impl<K: KeyManagementService> KmsSigner<K> {
	/// Bind `key` to `parent`.
	///
	/// Fetches the public key of `key` and fails with [`Error::KeyMismatch`]
	/// when it is not the public key certified by `parent`.
	pub fn new(kms: K, key: KeyVersionName, parent: &CertificateDer<'_>) -> Result<Self> {
		let remote = kms.public_key(&key)?;
		let public_key = SubjectKey::from_spki_der(&remote.spki_der)?;

		let (_, parent_cert) = X509Certificate::from_der(parent.as_ref())
			.map_err(|e| Error::InvalidParent(e.to_string()))?;
		let parent_key = SubjectKey::from_spki(parent_cert.public_key())?;
		if parent_key != public_key {
			return Err(Error::KeyMismatch);
		}

		tracing::debug!(%key, algorithm = %remote.algorithm, "bound KMS key to parent certificate");
		Ok(Self {
			kms,
			key,
			algorithm: remote.algorithm,
			public_key,
			parent: parent.clone().into_owned(),
		})
	}

	/// The KMS key version this signer uses.
	pub fn key(&self) -> &KeyVersionName {
		&self.key
	}

	/// The signing algorithm reported by the KMS.
	pub fn algorithm(&self) -> KmsAlgorithm {
		self.algorithm
	}

	/// Sign `template` for `public_key`, issued by the parent certificate.
	///
	/// With `generate_comment` the certificate carries a non-critical comment
	/// extension naming the KMS key version. The signature returned by the KMS
	/// is checked against the parent certificate before the DER is returned.
	pub fn create_certificate(
		&self,
		template: &CertificateParams,
		public_key: &impl PublicKeyData,
		generate_comment: bool,
	) -> Result<CertificateDer<'static>> {
		let mut params = template.clone();
		if generate_comment {
			params.custom_extensions.push(self.comment_extension());
		}

		let failure = RefCell::new(None);
		let signing_key = RemoteSigningKey {
			signer: self,
			failure: &failure,
		};
		let issuer = Issuer::from_ca_cert_der(&self.parent, signing_key)
			.map_err(|e| Error::InvalidParent(e.to_string()))?;

		let cert = match params.signed_by(public_key, &issuer) {
			Ok(cert) => cert,
			Err(err) => {
				let cause = failure.take().unwrap_or(Error::Certificate(err));
				return Err(Error::Signing(Box::new(cause)));
			},
		};

		self.verify_issued(cert.der())?;
		Ok(cert.der().clone())
	}

	fn comment_extension(&self) -> CustomExtension {
		let comment = format!("Signed by KMS key {}", self.key);
		let content = yasna::construct_der(|writer| writer.write_ia5_string(&comment));
		CustomExtension::from_oid_content(OID_NETSCAPE_COMMENT, content)
	}

	fn verify_issued(&self, der: &CertificateDer<'_>) -> Result<()> {
		let (_, parent) = X509Certificate::from_der(self.parent.as_ref())
			.map_err(|e| Error::InvalidParent(e.to_string()))?;
		let (_, issued) = X509Certificate::from_der(der.as_ref())
			.map_err(|e| Error::Signing(Box::new(Error::KmsResponse(e.to_string()))))?;
		issued
			.verify_signature(Some(parent.public_key()))
			.map_err(|_| Error::Signing(Box::new(Error::KeyMismatch)))
	}
}

/// Adapts a [`KmsSigner`] to rcgen, keeping the KMS error that rcgen would
/// otherwise flatten into [`rcgen::Error::RemoteKeyError`].
struct RemoteSigningKey<'a, K> {
	signer: &'a KmsSigner<K>,
	failure: &'a RefCell<Option<Error>>,
}

impl<K: KeyManagementService> PublicKeyData for RemoteSigningKey<'_, K> {
	fn der_bytes(&self) -> &[u8] {
		self.signer.public_key.der_bytes()
	}

	fn algorithm(&self) -> &'static rcgen::SignatureAlgorithm {
		self.signer.algorithm.signature_algorithm()
	}
}

impl<K: KeyManagementService> SigningKey for RemoteSigningKey<'_, K> {
	fn sign(&self, msg: &[u8]) -> std::result::Result<Vec<u8>, rcgen::Error> {
		self.signer
			.kms
			.asymmetric_sign(&self.signer.key, self.signer.algorithm, msg)
			.map_err(|err| {
				tracing::debug!(error = %err, "KMS signing failed");
				*self.failure.borrow_mut() = Some(err);
				rcgen::Error::RemoteKeyError
			})
	}
}
