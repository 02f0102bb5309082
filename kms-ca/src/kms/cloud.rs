//! Google Cloud KMS, spoken to over its public REST API.
//!
//! Authentication is the caller's concern: the client is handed an OAuth2
//! access token (for instance from `gcloud auth print-access-token`).

use std::time::Duration;

use base64ct::{Base64, Encoding};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Url;
use ring::digest;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{KeyManagementService, KeyVersionName, KmsAlgorithm, RemotePublicKey};
use crate::{Error, Result};

/// Cloud KMS v1 REST endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://cloudkms.googleapis.com/v1/";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for [`CloudKms`].
#[derive(Clone, Debug)]
pub struct CloudKmsConfig {
	/// Base URL of the REST API.
	pub endpoint: String,
	/// OAuth2 bearer token with `cloudkms.cryptoKeyVersions.useToSign` and
	/// `viewPublicKey` permissions on the key.
	pub access_token: String,
	/// Deadline for each request; `None` waits forever.
	pub timeout: Option<Duration>,
}

impl CloudKmsConfig {
	/// Default endpoint and timeout with the given token.
	pub fn new(access_token: impl Into<String>) -> Self {
		Self {
			endpoint: DEFAULT_ENDPOINT.to_owned(),
			access_token: access_token.into(),
			timeout: Some(DEFAULT_TIMEOUT),
		}
	}
}

/// Blocking Cloud KMS client.
///
/// Must not be used from inside an async runtime.
#[derive(Debug)]
pub struct CloudKms {
	client: Client,
	endpoint: Url,
}

impl CloudKms {
	/// Build the HTTP client. No request is made until the client is used.
	pub fn new(config: CloudKmsConfig) -> Result<Self> {
		let token = config.access_token.trim();
		if token.is_empty() {
			return Err(Error::KmsClient("no access token".into()));
		}

		let mut endpoint = config.endpoint;
		if !endpoint.ends_with('/') {
			endpoint.push('/');
		}
		let endpoint = Url::parse(&endpoint)
			.map_err(|e| Error::KmsClient(format!("invalid endpoint {endpoint:?}: {e}")))?;

		let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
			.map_err(|_| Error::KmsClient("access token is not a valid header value".into()))?;
		auth.set_sensitive(true);
		let mut headers = HeaderMap::new();
		headers.insert(header::AUTHORIZATION, auth);

		let mut builder = Client::builder().default_headers(headers);
		if let Some(timeout) = config.timeout {
			builder = builder.timeout(timeout);
		}
		let client = builder
			.build()
			.map_err(|e| Error::KmsClient(e.to_string()))?;

		Ok(Self { client, endpoint })
	}

	fn url(&self, key: &KeyVersionName, method: &str) -> Result<Url> {
		self.endpoint
			.join(&format!("{key}{method}"))
			.map_err(|e| Error::KmsClient(format!("cannot address {key}: {e}")))
	}

	fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
		let response = request
			.send()
			.map_err(|e| Error::KmsRequest(e.to_string()))?;
		let status = response.status();
		if !status.is_success() {
			let body = response.text().unwrap_or_default();
			return Err(Error::KmsStatus {
				status: status.as_u16(),
				message: error_message(&body),
			});
		}
		response
			.json()
			.map_err(|e| Error::KmsResponse(e.to_string()))
	}
}

impl KeyManagementService for CloudKms {
	fn public_key(&self, key: &KeyVersionName) -> Result<RemotePublicKey> {
		let url = self.url(key, "/publicKey")?;
		tracing::debug!(%url, "fetching KMS public key");
		let response: PublicKeyResponse = self.send(self.client.get(url))?;
		response.into_remote_public_key()
	}

	fn asymmetric_sign(
		&self,
		key: &KeyVersionName,
		algorithm: KmsAlgorithm,
		message: &[u8],
	) -> Result<Vec<u8>> {
		let url = self.url(key, ":asymmetricSign")?;
		tracing::debug!(%url, %algorithm, len = message.len(), "requesting KMS signature");
		let body = AsymmetricSignRequest::new(algorithm, message);
		let response: AsymmetricSignResponse = self.send(self.client.post(url).json(&body))?;
		Base64::decode_vec(&response.signature)
			.map_err(|e| Error::KmsResponse(format!("signature is not base64: {e}")))
	}
}

#[derive(Debug, Deserialize)]
struct PublicKeyResponse {
	pem: String,
	algorithm: String,
}

impl PublicKeyResponse {
	fn into_remote_public_key(self) -> Result<RemotePublicKey> {
		let algorithm = self.algorithm.parse()?;
		let pem = pem::parse(&self.pem)
			.map_err(|e| Error::KmsResponse(format!("public key is not PEM: {e}")))?;
		if pem.tag() != "PUBLIC KEY" {
			return Err(Error::KmsResponse(format!(
				"expected a PUBLIC KEY block, got {}",
				pem.tag()
			)));
		}
		Ok(RemotePublicKey {
			algorithm,
			spki_der: pem.into_contents(),
		})
	}
}

#[derive(Debug, Serialize)]
struct AsymmetricSignRequest {
	#[serde(skip_serializing_if = "Option::is_none")]
	digest: Option<Digest>,
	#[serde(skip_serializing_if = "Option::is_none")]
	data: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum Digest {
	Sha256(String),
	Sha384(String),
	Sha512(String),
}

impl AsymmetricSignRequest {
	fn new(algorithm: KmsAlgorithm, message: &[u8]) -> Self {
		let Some(alg) = algorithm.digest() else {
			return Self {
				digest: None,
				data: Some(Base64::encode_string(message)),
			};
		};
		let encoded = Base64::encode_string(digest::digest(alg, message).as_ref());
		let digest = if alg == &digest::SHA384 {
			Digest::Sha384(encoded)
		} else if alg == &digest::SHA512 {
			Digest::Sha512(encoded)
		} else {
			Digest::Sha256(encoded)
		};
		Self {
			digest: Some(digest),
			data: None,
		}
	}
}

#[derive(Debug, Deserialize)]
struct AsymmetricSignResponse {
	signature: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
	error: ErrorStatus,
}

#[derive(Debug, Deserialize)]
struct ErrorStatus {
	message: String,
	#[serde(default)]
	status: Option<String>,
}

/// Pull the message out of a `google.rpc.Status` error body, falling back to the raw text.
fn error_message(body: &str) -> String {
	match serde_json::from_str::<ErrorResponse>(body) {
		Ok(ErrorResponse {
			error: ErrorStatus {
				message,
				status: Some(status),
			},
		}) => format!("{status}: {message}"),
		Ok(ErrorResponse { error }) => error.message,
		Err(_) => body.trim().to_owned(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::{BufRead, BufReader, Read, Write};
	use std::net::{SocketAddr, TcpListener};
	use std::thread::{self, JoinHandle};

	const P256_PUBLIC_KEY: &str = "-----BEGIN PUBLIC KEY-----
MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAEXkwgoYL5AAr1Du6ytTQhnUXcwtKv
lqdTaUSsAZyOLOIFP2yXbfdDl5f6UMVvmn1ek+Vt9UH6xbt+3ksg2rQFxw==
-----END PUBLIC KEY-----
";

	fn key() -> KeyVersionName {
		"projects/p/locations/us-east1/keyRings/r/cryptoKeys/k/cryptoKeyVersions/3"
			.parse()
			.unwrap()
	}

	#[test]
	fn client_requires_token() {
		assert!(matches!(
			CloudKms::new(CloudKmsConfig::new("  ")),
			Err(Error::KmsClient(_))
		));
	}

	#[test]
	fn client_rejects_bad_endpoint() {
		let config = CloudKmsConfig {
			endpoint: "not a url".into(),
			..CloudKmsConfig::new("token")
		};
		assert!(matches!(CloudKms::new(config), Err(Error::KmsClient(_))));
	}

	#[test]
	fn request_urls() {
		let kms = CloudKms::new(CloudKmsConfig {
			endpoint: "http://localhost:8080/v1".into(),
			..CloudKmsConfig::new("token")
		})
		.unwrap();
		assert_eq!(
			kms.url(&key(), "/publicKey").unwrap().as_str(),
			"http://localhost:8080/v1/projects/p/locations/us-east1/keyRings/r/cryptoKeys/k/cryptoKeyVersions/3/publicKey"
		);
		assert_eq!(
			kms.url(&key(), ":asymmetricSign").unwrap().as_str(),
			"http://localhost:8080/v1/projects/p/locations/us-east1/keyRings/r/cryptoKeys/k/cryptoKeyVersions/3:asymmetricSign"
		);
	}

	#[test]
	fn sign_request_carries_digest() {
		let body =
			serde_json::to_value(AsymmetricSignRequest::new(KmsAlgorithm::EcSignP256Sha256, b"abc"))
				.unwrap();
		assert_eq!(
			body,
			serde_json::json!({
				"digest": { "sha256": "ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0=" }
			})
		);

		let body = serde_json::to_value(AsymmetricSignRequest::new(
			KmsAlgorithm::EcSignP384Sha384,
			b"abc",
		))
		.unwrap();
		assert!(body["digest"]["sha384"].is_string());
	}

	#[test]
	fn ed25519_request_carries_data() {
		let body =
			serde_json::to_value(AsymmetricSignRequest::new(KmsAlgorithm::EcSignEd25519, b"abc"))
				.unwrap();
		assert_eq!(body, serde_json::json!({ "data": "YWJj" }));
	}

	#[test]
	fn parse_public_key_response() {
		let response: PublicKeyResponse = serde_json::from_value(serde_json::json!({
			"pem": P256_PUBLIC_KEY,
			"algorithm": "EC_SIGN_P256_SHA256",
			"pemCrc32c": "1234",
			"name": key().to_string(),
		}))
		.unwrap();
		let remote = response.into_remote_public_key().unwrap();
		assert_eq!(remote.algorithm, KmsAlgorithm::EcSignP256Sha256);
		assert_eq!(remote.spki_der.len(), 91);
	}

	#[test]
	fn reject_unsupported_public_key_algorithm() {
		let response = PublicKeyResponse {
			pem: P256_PUBLIC_KEY.into(),
			algorithm: "RSA_DECRYPT_OAEP_2048_SHA256".into(),
		};
		assert!(matches!(
			response.into_remote_public_key(),
			Err(Error::UnsupportedAlgorithm(_))
		));
	}

	#[test]
	fn error_messages() {
		let body = r#"{"error": {"code": 403, "message": "Permission denied on resource", "status": "PERMISSION_DENIED"}}"#;
		assert_eq!(
			error_message(body),
			"PERMISSION_DENIED: Permission denied on resource"
		);
		assert_eq!(error_message("upstream connect error\n"), "upstream connect error");
	}

	/// Answer one connection per canned `(status, body)` pair, in order, and
	/// hand back each request as received.
	fn serve(responses: Vec<(u16, String)>) -> (SocketAddr, JoinHandle<Vec<String>>) {
		let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
		let addr = listener.local_addr().expect("local addr");
		let handle = thread::spawn(move || {
			let mut requests = Vec::new();
			for (status, body) in responses {
				let (stream, _) = listener.accept().expect("accept");
				let mut reader = BufReader::new(stream);
				let mut request = String::new();
				let mut content_length = 0;
				loop {
					let mut line = String::new();
					reader.read_line(&mut line).expect("read request line");
					if let Some((name, value)) = line.split_once(':') {
						if name.eq_ignore_ascii_case("content-length") {
							content_length = value.trim().parse().expect("content length");
						}
					}
					request.push_str(&line);
					if line == "\r\n" || line.is_empty() {
						break;
					}
				}
				let mut request_body = vec![0; content_length];
				reader.read_exact(&mut request_body).expect("read body");
				request.push_str(&String::from_utf8(request_body).expect("utf-8 body"));
				requests.push(request);

				let mut stream = reader.into_inner();
				write!(
					stream,
					"HTTP/1.1 {status} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
					body.len()
				)
				.expect("write response");
			}
			requests
		});
		(addr, handle)
	}

	fn local_client(addr: SocketAddr) -> CloudKms {
		CloudKms::new(CloudKmsConfig {
			endpoint: format!("http://{addr}/v1"),
			access_token: "ya29.token".into(),
			timeout: Some(Duration::from_secs(5)),
		})
		.unwrap()
	}

	#[test]
	fn public_key_and_sign_over_http() {
		let public_key = serde_json::json!({
			"pem": P256_PUBLIC_KEY,
			"algorithm": "EC_SIGN_P256_SHA256",
		});
		let (addr, server) = serve(vec![
			(200, public_key.to_string()),
			(200, r#"{"signature": "c2lnbmF0dXJl", "name": "ignored"}"#.into()),
		]);
		let kms = local_client(addr);

		let remote = kms.public_key(&key()).unwrap();
		assert_eq!(remote.algorithm, KmsAlgorithm::EcSignP256Sha256);
		assert_eq!(remote.spki_der.len(), 91);
		let signature = kms
			.asymmetric_sign(&key(), KmsAlgorithm::EcSignP256Sha256, b"abc")
			.unwrap();
		assert_eq!(signature, b"signature");

		let requests = server.join().unwrap();
		assert!(requests[0].starts_with(&format!("GET /v1/{}/publicKey HTTP/1.1", key())));
		assert!(requests[1].starts_with(&format!("POST /v1/{}:asymmetricSign HTTP/1.1", key())));
		for request in &requests {
			assert!(request
				.to_ascii_lowercase()
				.contains("authorization: bearer ya29.token"));
		}
		assert!(requests[1].ends_with(r#"{"digest":{"sha256":"ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0="}}"#));
	}

	#[test]
	fn http_errors_keep_status() {
		let (addr, server) = serve(vec![
			(
				403,
				r#"{"error": {"code": 403, "message": "Permission denied", "status": "PERMISSION_DENIED"}}"#
					.into(),
			),
			(503, "upstream unavailable".into()),
		]);
		let kms = local_client(addr);

		match kms.public_key(&key()) {
			Err(err @ Error::KmsStatus { status: 403, .. }) => {
				assert!(!err.is_transient());
				assert!(err.to_string().contains("PERMISSION_DENIED: Permission denied"));
			},
			other => panic!("unexpected result {other:?}"),
		}
		match kms.asymmetric_sign(&key(), KmsAlgorithm::EcSignEd25519, b"abc") {
			Err(err @ Error::KmsStatus { status: 503, .. }) => assert!(err.is_transient()),
			other => panic!("unexpected result {other:?}"),
		}
		server.join().unwrap();
	}

	#[test]
	fn malformed_bodies_are_response_errors() {
		let (addr, server) = serve(vec![
			(200, "<html>not json</html>".into()),
			(200, r#"{"signature": "!!not base64!!"}"#.into()),
			(
				200,
				serde_json::json!({
					"pem": "-----BEGIN CERTIFICATE-----\nMAA=\n-----END CERTIFICATE-----\n",
					"algorithm": "EC_SIGN_P256_SHA256",
				})
				.to_string(),
			),
		]);
		let kms = local_client(addr);

		assert!(matches!(
			kms.public_key(&key()),
			Err(Error::KmsResponse(_))
		));
		assert!(matches!(
			kms.asymmetric_sign(&key(), KmsAlgorithm::EcSignP256Sha256, b"abc"),
			Err(Error::KmsResponse(_))
		));
		assert!(matches!(
			kms.public_key(&key()),
			Err(Error::KmsResponse(_))
		));
		server.join().unwrap();
	}

	#[test]
	fn unreachable_endpoint_is_request_error() {
		let addr = TcpListener::bind("127.0.0.1:0")
			.unwrap()
			.local_addr()
			.unwrap();
		let err = local_client(addr).public_key(&key()).unwrap_err();
		assert!(matches!(err, Error::KmsRequest(_)), "{err:?}");
		assert!(err.is_transient());
	}
}
