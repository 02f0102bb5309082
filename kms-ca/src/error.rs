use thiserror::Error;

/// A specialized `Result` type for issuance operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while issuing an intermediate CA certificate.
///
/// Every error is fatal to the operation that raised it; nothing is retried.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
	/// The KMS client could not be constructed (bad endpoint, missing credentials).
	#[error("could not construct the KMS client: {0}")]
	KmsClient(String),

	/// The key identifier is not a KMS key version name.
	#[error("invalid KMS key version name {0:?}")]
	InvalidKeyName(String),

	/// The KMS key or the CSR key uses an algorithm this crate cannot sign with or encode.
	#[error("unsupported key algorithm: {0}")]
	UnsupportedAlgorithm(String),

	/// The request never produced an HTTP response (DNS, TLS, timeout, connection reset).
	#[error("KMS request failed: {0}")]
	KmsRequest(String),

	/// The KMS answered with an error status.
	#[error("KMS returned {status}: {message}")]
	KmsStatus {
		/// HTTP status code of the response.
		status: u16,
		/// Error message reported by the service.
		message: String,
	},

	/// The KMS answered successfully but the body could not be understood.
	#[error("unexpected KMS response: {0}")]
	KmsResponse(String),

	/// The parent certificate could not be parsed.
	#[error("could not parse parent certificate: {0}")]
	InvalidParent(String),

	/// The parent certificate's public key is not the public half of the KMS key.
	#[error("parent certificate public key does not match the KMS key")]
	KeyMismatch,

	/// The certificate signing request could not be parsed.
	#[error("could not parse certificate signing request: {0}")]
	InvalidCsr(String),

	/// The certificate signing request's self-signature does not verify.
	#[error("certificate signing request signature is invalid")]
	CsrSignature,

	/// The issuance parameters cannot produce a valid certificate.
	#[error("invalid certificate parameters: {0}")]
	InvalidTemplate(String),

	/// Signing the certificate failed.
	#[error("signing failed: {0}")]
	Signing(#[source] Box<Error>),

	/// Certificate encoding failed.
	#[error(transparent)]
	Certificate(#[from] rcgen::Error),

	/// Writing the issued certificate failed.
	#[error("could not write certificate: {0}")]
	Output(#[from] std::io::Error),
}

impl Error {
	/// Whether the failure came from the KMS infrastructure rather than from the
	/// inputs, so that a later attempt with the same inputs could succeed.
	pub fn is_transient(&self) -> bool {
		match self {
			Error::KmsRequest(_) => true,
			Error::KmsStatus { status, .. } => *status == 429 || *status >= 500,
			Error::Signing(inner) => inner.is_transient(),
			_ => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn transient_errors() {
		assert!(Error::KmsRequest("connection reset".into()).is_transient());
		assert!(Error::KmsStatus {
			status: 503,
			message: "unavailable".into()
		}
		.is_transient());
		assert!(Error::KmsStatus {
			status: 429,
			message: "quota".into()
		}
		.is_transient());
		assert!(Error::Signing(Box::new(Error::KmsRequest("timeout".into()))).is_transient());
	}

	#[test]
	fn configuration_errors_are_not_transient() {
		assert!(!Error::KeyMismatch.is_transient());
		assert!(!Error::CsrSignature.is_transient());
		assert!(!Error::KmsStatus {
			status: 403,
			message: "permission denied".into()
		}
		.is_transient());
		assert!(!Error::Signing(Box::new(Error::KeyMismatch)).is_transient());
	}
}
