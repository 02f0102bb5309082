use std::io::Write;

use pem::{EncodeConfig, LineEnding, Pem};
use pki_types::{CertificateDer, CertificateSigningRequestDer};
use time::OffsetDateTime;

use crate::csr::VerifiedCsr;
use crate::kms::{KeyManagementService, KeyVersionName};
use crate::signer::KmsSigner;
use crate::template::IntermediateParams;
use crate::Result;

const ENCODE_CONFIG: EncodeConfig = EncodeConfig::new().set_line_ending(LineEnding::LF);

/// Sign `csr` as an intermediate CA under `parent` with the KMS key `key`,
/// and write the certificate to `out` as a PEM `CERTIFICATE` block.
///
/// Nothing is written unless the certificate was issued.
pub fn sign_intermediate_ca<K, W>(
	kms: K,
	key: KeyVersionName,
	parent: &CertificateDer<'_>,
	csr: &CertificateSigningRequestDer<'_>,
	params: &IntermediateParams,
	out: &mut W,
) -> Result<()>
where
	K: KeyManagementService,
	W: Write + ?Sized,
{
	let cert = issue_intermediate_ca(kms, key, parent, csr, params)?;
	out.write_all(encode_pem(&cert).as_bytes())?;
	out.flush()?;
	Ok(())
}

/// Like [`sign_intermediate_ca`], returning the DER encoded certificate.
///
/// The CSR signature is verified before the KMS is asked to sign anything.
pub fn issue_intermediate_ca<K: KeyManagementService>(
	kms: K,
	key: KeyVersionName,
	parent: &CertificateDer<'_>,
	csr: &CertificateSigningRequestDer<'_>,
	params: &IntermediateParams,
) -> Result<CertificateDer<'static>> {
	let signer = KmsSigner::new(kms, key, parent)?;
	let csr = VerifiedCsr::from_der(csr)?;
	let template = params.template(csr.subject(), OffsetDateTime::now_utc())?;
	let cert = signer.create_certificate(&template, csr.public_key(), params.generate_comment)?;

	tracing::info!(
		key = %signer.key(),
		subject = ?template.distinguished_name,
		not_after = %template.not_after,
		"issued intermediate CA certificate"
	);
	Ok(cert)
}

/// PEM encode a certificate with LF line endings.
pub fn encode_pem(cert: &CertificateDer<'_>) -> String {
	pem::encode_config(&Pem::new("CERTIFICATE", cert.to_vec()), ENCODE_CONFIG)
}
