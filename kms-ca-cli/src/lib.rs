#![warn(missing_docs)]
//! Command line front end for [kms_ca]: reads the parent certificate and
//! the CSR from disk, signs with Cloud KMS (or a local key), and writes the
//! issued intermediate CA certificate as PEM.

use std::{fs, io::Write, path::Path, time::Duration};

use anyhow::{bail, Context};
use kms_ca::{sign_intermediate_ca, CloudKms, CloudKmsConfig, KeyVersionName, LocalKms};
use pki_types::{CertificateDer, CertificateSigningRequestDer};

mod args;
pub use args::{options, Options};
mod subject;
pub use subject::parse_subject;

/// Issue the certificate described by `opts`.
///
/// The output file is only created once the certificate has been issued.
pub fn run(opts: &Options) -> anyhow::Result<()> {
	let key: KeyVersionName = opts.kms_key.parse()?;
	let parent = CertificateDer::from(read_pem_or_der(&opts.parent_cert, &["CERTIFICATE"])?);
	let csr = CertificateSigningRequestDer::from(read_pem_or_der(
		&opts.csr,
		&["CERTIFICATE REQUEST", "NEW CERTIFICATE REQUEST"],
	)?);
	let params = opts.intermediate_params();

	let mut pem = Vec::new();
	match &opts.local_key {
		Some(path) => {
			tracing::info!(key = %path.display(), "signing with local key");
			let key_pem = fs::read_to_string(path)
				.with_context(|| format!("reading {}", path.display()))?;
			let mut kms = LocalKms::new();
			kms.load_pem(key.clone(), &key_pem)
				.with_context(|| format!("loading {}", path.display()))?;
			sign_intermediate_ca(&kms, key, &parent, &csr, &params, &mut pem)?;
		},
		None => {
			let Some(access_token) = opts.access_token.clone() else {
				bail!("--access-token or GOOGLE_OAUTH_ACCESS_TOKEN is required to use Cloud KMS");
			};
			let kms = CloudKms::new(CloudKmsConfig {
				endpoint: opts.kms_endpoint.clone(),
				access_token,
				timeout: Some(Duration::from_secs(opts.timeout_secs)),
			})?;
			sign_intermediate_ca(&kms, key, &parent, &csr, &params, &mut pem)?;
		},
	}

	match &opts.out {
		Some(path) => {
			fs::write(path, &pem).with_context(|| format!("writing {}", path.display()))?
		},
		None => {
			let mut stdout = std::io::stdout().lock();
			stdout.write_all(&pem)?;
			stdout.flush()?;
		},
	}
	Ok(())
}

/// Read a file holding either one PEM block with one of `tags`, or raw DER.
fn read_pem_or_der(path: &Path, tags: &[&str]) -> anyhow::Result<Vec<u8>> {
	let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
	if !bytes.starts_with(b"-----BEGIN") {
		return Ok(bytes);
	}

	let pem = pem::parse(&bytes).with_context(|| format!("parsing {}", path.display()))?;
	if !tags.contains(&pem.tag()) {
		bail!(
			"{}: expected {}, found {}",
			path.display(),
			tags[0],
			pem.tag()
		);
	}
	Ok(pem.into_contents())
}
