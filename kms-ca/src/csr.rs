use pki_types::CertificateSigningRequestDer;
use rcgen::{DistinguishedName, DnType};
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::prelude::FromDer;
use x509_parser::x509::X509Name;

use crate::key::SubjectKey;
use crate::{Error, Result};

/// A certificate signing request whose self-signature has been checked.
#[derive(Clone, Debug)]
pub struct VerifiedCsr {
	subject: DistinguishedName,
	public_key: SubjectKey,
}

impl VerifiedCsr {
	/// Parse a DER encoded PKCS#10 request and verify its signature with the
	/// public key it carries.
	pub fn from_der(csr: &CertificateSigningRequestDer<'_>) -> Result<Self> {
		let (_, csr) = X509CertificationRequest::from_der(csr.as_ref())
			.map_err(|e| Error::InvalidCsr(e.to_string()))?;
		csr.verify_signature().map_err(|_| Error::CsrSignature)?;

		let info = &csr.certification_request_info;
		let public_key = SubjectKey::from_spki(&info.subject_pki)?;
		let subject = distinguished_name(&info.subject)?;
		Ok(Self {
			subject,
			public_key,
		})
	}

	/// Parse a PEM `CERTIFICATE REQUEST` block, see [`from_der`](Self::from_der).
	pub fn from_pem(pem_str: &str) -> Result<Self> {
		let pem = pem::parse(pem_str).map_err(|e| Error::InvalidCsr(e.to_string()))?;
		match pem.tag() {
			"CERTIFICATE REQUEST" | "NEW CERTIFICATE REQUEST" => {},
			tag => return Err(Error::InvalidCsr(format!("unexpected PEM tag {tag}"))),
		}
		Self::from_der(&CertificateSigningRequestDer::from(pem.into_contents()))
	}

	/// The subject name the requester asked for.
	pub fn subject(&self) -> &DistinguishedName {
		&self.subject
	}

	/// The requester's public key.
	pub fn public_key(&self) -> &SubjectKey {
		&self.public_key
	}
}

fn distinguished_name(name: &X509Name<'_>) -> Result<DistinguishedName> {
	let mut dn = DistinguishedName::new();
	for attr in name.iter_attributes() {
		let oid = attr
			.attr_type()
			.iter()
			.ok_or_else(|| Error::InvalidCsr("subject attribute OID too large".into()))?
			.collect::<Vec<_>>();
		let value = attr
			.as_str()
			.map_err(|e| Error::InvalidCsr(format!("subject attribute: {e}")))?;
		let ty = DnType::from_oid(&oid);
		// rcgen keeps one value per attribute type
		if dn.get(&ty).is_some() {
			return Err(Error::InvalidCsr(format!(
				"subject repeats attribute {}",
				attr.attr_type()
			)));
		}
		dn.push(ty, value);
	}
	Ok(dn)
}
