/*!
Issue intermediate CA certificates signed by a key that lives in a KMS.

The CA's private key never leaves the key-management service. This crate
verifies the subordinate CA's certificate signing request, builds the
certificate (subject, validity, CA basic constraints with a path length,
key usages, optional DNS name constraints and CRL distribution points),
has the KMS sign it, and emits it as PEM.

X.509 encoding is done by [rcgen], parsing and signature checks by
[x509-parser](https://docs.rs/x509-parser). KMS backends plug in through
[`KeyManagementService`]: [`CloudKms`] talks to Google Cloud KMS, and
[`LocalKms`] keeps software keys in memory.

## Example

```
use kms_ca::{sign_intermediate_ca, IntermediateParams, KeyVersionName, LocalKms};
use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};

# fn main() -> Result<(), Box<dyn std::error::Error>> {
let key: KeyVersionName =
	"projects/acme/locations/global/keyRings/pki/cryptoKeys/root/cryptoKeyVersions/1".parse()?;

// The root CA key, standing in for a cloud key.
let mut kms = LocalKms::new();
let root_key = kms.generate(key.clone(), &rcgen::PKCS_ECDSA_P256_SHA256)?;
let mut root = CertificateParams::new(Vec::<String>::new())?;
root.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
let root = root.self_signed(root_key)?;

// The subordinate CA's request, produced wherever its key lives.
let sub_key = KeyPair::generate()?;
let csr = CertificateParams::new(Vec::<String>::new())?.serialize_request(&sub_key)?;

let params = IntermediateParams::new(365)
	.path_len(Some(0))
	.permitted_dns_domain("example.com");
let mut pem = Vec::new();
sign_intermediate_ca(&kms, key, root.der(), csr.der(), &params, &mut pem)?;
assert!(pem.starts_with(b"-----BEGIN CERTIFICATE-----"));
# Ok(())
# }
```
*/
#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod csr;
mod error;
mod issue;
mod key;
pub mod kms;
mod signer;
mod template;

pub use csr::VerifiedCsr;
pub use error::{Error, Result};
pub use issue::{encode_pem, issue_intermediate_ca, sign_intermediate_ca};
pub use key::SubjectKey;
#[cfg(feature = "cloudkms")]
pub use kms::{CloudKms, CloudKmsConfig};
pub use kms::{KeyManagementService, KeyVersionName, KmsAlgorithm, LocalKms, RemotePublicKey};
pub use signer::KmsSigner;
pub use template::IntermediateParams;
