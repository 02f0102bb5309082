//! Command Line argument parsing
#![allow(missing_docs)]

use std::path::PathBuf;

use bpaf::Bpaf;
use kms_ca::IntermediateParams;
use rcgen::DistinguishedName;

use crate::subject::parse_subject;

#[derive(Clone, Debug, Bpaf)]
#[bpaf(options, version)]
/// kms-ca: sign an intermediate CA certificate with a key held in Cloud KMS
pub struct Options {
	/// KMS key version holding the parent CA's private key
	/// (projects/../locations/../keyRings/../cryptoKeys/../cryptoKeyVersions/..)
	#[bpaf(long, env("KMS_CA_KEY"), argument("NAME"))]
	pub kms_key: String,
	/// OAuth2 access token for Cloud KMS
	#[bpaf(long, env("GOOGLE_OAUTH_ACCESS_TOKEN"), argument("TOKEN"), optional)]
	pub access_token: Option<String>,
	/// Cloud KMS REST endpoint
	#[bpaf(
		long,
		env("KMS_CA_ENDPOINT"),
		argument("URL"),
		fallback(kms_ca::kms::DEFAULT_ENDPOINT.into()),
		display_fallback
	)]
	pub kms_endpoint: String,
	/// Seconds to wait for each KMS request
	#[bpaf(long, argument("SECONDS"), fallback(30), display_fallback)]
	pub timeout_secs: u64,
	/// Sign with this PEM private key instead of Cloud KMS
	#[bpaf(long, argument("PATH"), optional)]
	pub local_key: Option<PathBuf>,
	/// Parent CA certificate, PEM or DER
	#[bpaf(long, argument("PATH"))]
	pub parent_cert: PathBuf,
	/// Certificate signing request of the intermediate CA, PEM or DER
	#[bpaf(long, argument("PATH"))]
	pub csr: PathBuf,
	/// Subject of the issued certificate, e.g. "CN=Issuing CA,O=Example,C=US".
	/// Defaults to the subject of the CSR
	#[bpaf(long, argument::<String>("DN"), parse(subject), optional)]
	pub subject: Option<DistinguishedName>,
	/// Validity in days
	#[bpaf(long, argument("DAYS"), fallback(365), display_fallback)]
	pub days: u32,
	/// Path length constraint
	#[bpaf(long, argument("N"), fallback(0), display_fallback)]
	pub path_len: u8,
	/// Omit the path length constraint
	#[bpaf(long)]
	pub no_path_len: bool,
	/// DNS domain the intermediate may issue for (repeat, or separate with commas)
	#[bpaf(long("permitted-dns-domain"), argument::<String>("DOMAIN"), many, map(split_lists))]
	pub permitted_dns_domains: Vec<String>,
	/// CRL distribution point URL (repeat for more than one)
	#[bpaf(long("crl-distribution-point"), argument::<String>("URL"), many)]
	pub crl_distribution_points: Vec<String>,
	/// Annotate the certificate with a comment naming the KMS key
	#[bpaf(long)]
	pub generate_comment: bool,
	/// Write the certificate here instead of stdout
	#[bpaf(short, long, argument("PATH"), optional)]
	pub out: Option<PathBuf>,
}

impl Options {
	/// Issuance parameters requested on the command line.
	pub fn intermediate_params(&self) -> IntermediateParams {
		IntermediateParams {
			subject: self.subject.clone(),
			days: self.days,
			path_len: (!self.no_path_len).then_some(self.path_len),
			permitted_dns_domains: self.permitted_dns_domains.clone(),
			crl_distribution_points: self.crl_distribution_points.clone(),
			generate_comment: self.generate_comment,
		}
	}
}

fn subject(s: String) -> Result<DistinguishedName, String> {
	parse_subject(&s)
}

/// Flatten comma separated values given to a repeatable flag.
fn split_lists(values: Vec<String>) -> Vec<String> {
	values
		.iter()
		.flat_map(|value| value.split(','))
		.map(str::trim)
		.filter(|value| !value.is_empty())
		.map(str::to_owned)
		.collect()
}
