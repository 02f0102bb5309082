use rcgen::{string::PrintableString, DistinguishedName, DnType, DnValue};

/// Parse a comma separated distinguished name such as
/// `CN=Issuing CA 1,O=Crab widgits SE,C=BR`.
///
/// Recognised attributes are `C`, `ST`, `L`, `O`, `OU` and `CN`. A literal
/// comma inside a value is written `\,`. Country names are encoded as
/// `PrintableString`, everything else as `UTF8String`.
pub fn parse_subject(s: &str) -> Result<DistinguishedName, String> {
	let mut dn = DistinguishedName::new();
	for rdn in split_unescaped(s) {
		let (key, value) = rdn
			.split_once('=')
			.ok_or_else(|| format!("expected KEY=VALUE, got {rdn:?}"))?;
		let value = value.trim();
		if value.is_empty() {
			return Err(format!("empty value for {}", key.trim()));
		}

		let ty = match key.trim().to_ascii_uppercase().as_str() {
			"C" => DnType::CountryName,
			"ST" => DnType::StateOrProvinceName,
			"L" => DnType::LocalityName,
			"O" => DnType::OrganizationName,
			"OU" => DnType::OrganizationalUnitName,
			"CN" => DnType::CommonName,
			other => return Err(format!("unsupported subject attribute {other:?}")),
		};
		if dn.get(&ty).is_some() {
			return Err(format!("attribute {} given more than once", key.trim()));
		}
		if ty == DnType::CountryName {
			let country = PrintableString::try_from(value)
				.map_err(|e| format!("invalid country {value:?}: {e}"))?;
			dn.push(ty, DnValue::PrintableString(country));
		} else {
			dn.push(ty, value);
		}
	}

	if dn.iter().next().is_none() {
		return Err("subject is empty".into());
	}
	Ok(dn)
}

fn split_unescaped(s: &str) -> Vec<String> {
	let mut parts = Vec::new();
	let mut current = String::new();
	let mut chars = s.chars();
	while let Some(c) = chars.next() {
		match c {
			'\\' => match chars.next() {
				Some(escaped) => current.push(escaped),
				None => current.push('\\'),
			},
			',' => parts.push(std::mem::take(&mut current)),
			c => current.push(c),
		}
	}
	parts.push(current);
	parts.retain(|part| !part.trim().is_empty());
	parts
}
