use rcgen::{
	BasicConstraints, CertificateParams, CrlDistributionPoint, DistinguishedName, GeneralSubtree,
	IsCa, KeyUsagePurpose, NameConstraints, SerialNumber,
};
use ring::rand::{SecureRandom, SystemRandom};
use time::{Duration, OffsetDateTime};

use crate::{Error, Result};

/// Length of generated serial numbers, the maximum RFC 5280 allows.
const SERIAL_LEN: usize = 20;

/// Last year GeneralizedTime can express.
const MAX_YEAR: i32 = 9999;

/// What the issued intermediate CA certificate should say.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntermediateParams {
	/// Subject of the issued certificate. `None` keeps the subject of the CSR.
	pub subject: Option<DistinguishedName>,
	/// Validity in days, counted from the moment of issuance.
	pub days: u32,
	/// Maximum number of intermediate certificates that may follow this one.
	/// `Some(0)` is encoded as a zero constraint, `None` as no constraint.
	pub path_len: Option<u8>,
	/// DNS domains subordinate certificates may name. Empty means unrestricted.
	pub permitted_dns_domains: Vec<String>,
	/// URLs where this CA's revocation lists are published.
	pub crl_distribution_points: Vec<String>,
	/// Ask the signer to annotate the certificate with a comment naming the KMS key.
	pub generate_comment: bool,
}

impl Default for IntermediateParams {
	fn default() -> Self {
		Self {
			subject: None,
			days: 365,
			path_len: Some(0),
			permitted_dns_domains: Vec::new(),
			crl_distribution_points: Vec::new(),
			generate_comment: false,
		}
	}
}

impl IntermediateParams {
	/// Parameters for a certificate valid for `days`, with a zero path length.
	pub fn new(days: u32) -> Self {
		Self {
			days,
			..Self::default()
		}
	}

	/// Override the CSR subject.
	pub fn subject(mut self, subject: DistinguishedName) -> Self {
		self.subject = Some(subject);
		self
	}

	/// Set the path length constraint.
	pub fn path_len(mut self, path_len: Option<u8>) -> Self {
		self.path_len = path_len;
		self
	}

	/// Permit a DNS domain. Multiple calls append.
	pub fn permitted_dns_domain(mut self, domain: impl Into<String>) -> Self {
		self.permitted_dns_domains.push(domain.into());
		self
	}

	/// Publish a CRL distribution point. Multiple calls append.
	pub fn crl_distribution_point(mut self, url: impl Into<String>) -> Self {
		self.crl_distribution_points.push(url.into());
		self
	}

	/// Request the signer's comment extension.
	pub fn generate_comment(mut self, generate_comment: bool) -> Self {
		self.generate_comment = generate_comment;
		self
	}

	/// Build the certificate template, valid from `now`.
	///
	/// `csr_subject` is used when no subject was set.
	pub fn template(
		&self,
		csr_subject: &DistinguishedName,
		now: OffsetDateTime,
	) -> Result<CertificateParams> {
		self.validate()?;

		let mut params = CertificateParams::default();
		params.distinguished_name = self
			.subject
			.clone()
			.unwrap_or_else(|| csr_subject.clone());
		params.serial_number = Some(random_serial()?);
		params.not_before = now;
		params.not_after = not_after(now, self.days)?;
		params.is_ca = IsCa::Ca(match self.path_len {
			Some(len) => BasicConstraints::Constrained(len),
			None => BasicConstraints::Unconstrained,
		});
		params.key_usages = vec![
			KeyUsagePurpose::DigitalSignature,
			KeyUsagePurpose::KeyCertSign,
			KeyUsagePurpose::CrlSign,
		];
		params.use_authority_key_identifier_extension = true;

		if !self.permitted_dns_domains.is_empty() {
			// rcgen always marks name constraints critical
			params.name_constraints = Some(NameConstraints {
				permitted_subtrees: self
					.permitted_dns_domains
					.iter()
					.cloned()
					.map(GeneralSubtree::DnsName)
					.collect(),
				excluded_subtrees: Vec::new(),
			});
		}

		params.crl_distribution_points = self
			.crl_distribution_points
			.iter()
			.map(|url| CrlDistributionPoint {
				uris: vec![url.clone()],
			})
			.collect();

		tracing::debug!(
			not_before = %params.not_before,
			not_after = %params.not_after,
			path_len = ?self.path_len,
			permitted_dns_domains = ?self.permitted_dns_domains,
			crl_distribution_points = ?self.crl_distribution_points,
			"built intermediate CA template"
		);
		Ok(params)
	}

	fn validate(&self) -> Result<()> {
		if self.days == 0 {
			return Err(Error::InvalidTemplate("validity must be at least one day".into()));
		}
		if self.permitted_dns_domains.iter().any(|d| d.trim().is_empty()) {
			return Err(Error::InvalidTemplate("empty permitted DNS domain".into()));
		}
		if self
			.crl_distribution_points
			.iter()
			.any(|url| url.trim().is_empty())
		{
			return Err(Error::InvalidTemplate("empty CRL distribution point".into()));
		}
		Ok(())
	}
}

/// End of a validity of `days` starting at `now`, within GeneralizedTime range.
fn not_after(now: OffsetDateTime, days: u32) -> Result<OffsetDateTime> {
	now.checked_add(Duration::days(i64::from(days)))
		.filter(|end| end.year() <= MAX_YEAR)
		.ok_or_else(|| {
			Error::InvalidTemplate(format!("validity of {days} days ends after year {MAX_YEAR}"))
		})
}

/// A random positive serial number.
fn random_serial() -> Result<SerialNumber> {
	let mut bytes = [0u8; SERIAL_LEN];
	SystemRandom::new()
		.fill(&mut bytes)
		.map_err(|_| Error::InvalidTemplate("system random number generator failed".into()))?;
	bytes[0] &= 0x7f;
	Ok(SerialNumber::from(bytes.to_vec()))
}
