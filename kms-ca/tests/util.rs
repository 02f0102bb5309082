use kms_ca::{KeyVersionName, LocalKms};
use pki_types::{CertificateDer, CertificateSigningRequestDer};
use rcgen::{
	BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair, KeyUsagePurpose,
	SignatureAlgorithm,
};

/// A root CA whose key is held by a [`LocalKms`].
pub struct Ca {
	pub kms: LocalKms,
	pub key: KeyVersionName,
	pub cert: CertificateDer<'static>,
}

impl Ca {
	pub fn new(alg: &'static SignatureAlgorithm) -> Self {
		let key: KeyVersionName =
			"projects/crabs/locations/global/keyRings/pki/cryptoKeys/root-ca/cryptoKeyVersions/1"
				.parse()
				.unwrap();
		let mut kms = LocalKms::new();
		let key_pair = kms.generate(key.clone(), alg).unwrap();

		let mut params = CertificateParams::default();
		params.distinguished_name = DistinguishedName::new();
		params
			.distinguished_name
			.push(DnType::OrganizationName, "Crab widgits SE");
		params
			.distinguished_name
			.push(DnType::CommonName, "Master CA");
		params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
		params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
		let cert = params.self_signed(key_pair).unwrap().der().clone();

		Self { kms, key, cert }
	}
}

/// A CSR for a fresh key, with subject `CN=Requested Issuing CA`.
pub fn csr(alg: &'static SignatureAlgorithm) -> (KeyPair, CertificateSigningRequestDer<'static>) {
	let key_pair = KeyPair::generate_for(alg).unwrap();
	let mut params = CertificateParams::default();
	params.distinguished_name = DistinguishedName::new();
	params
		.distinguished_name
		.push(DnType::CommonName, "Requested Issuing CA");
	let csr = params.serialize_request(&key_pair).unwrap();
	(key_pair, csr.der().clone())
}
