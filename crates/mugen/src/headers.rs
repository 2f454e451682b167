use indexmap::IndexMap;

/// Case-insensitive, insertion-order-preserving header map.
///
/// Lookup is by lowercased key. The casing the caller (or the wire) used
/// is retained so it can be echoed back out verbatim when the request is
/// serialized.
#[derive(Clone, Debug, Default)]
pub struct Headers {
	// lowercased key -> (original-case key, value)
	entries: IndexMap<String, (String, String)>,
}

impl Headers {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
		let key = key.into();
		let lower = key.to_ascii_lowercase();
		self.entries.insert(lower, (key, value.into()));
	}

	/// Append, combining with the existing value using `", "` if the key
	/// is already present (e.g. repeated `Set-Cookie` headers).
	pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
		let key = key.into();
		let lower = key.to_ascii_lowercase();
		let value = value.into();
		match self.entries.get_mut(&lower) {
			Some((_, existing)) => {
				existing.push_str(", ");
				existing.push_str(&value);
			},
			None => {
				self.entries.insert(lower, (key, value));
			},
		}
	}

	pub fn get(&self, key: &str) -> Option<&str> {
		self
			.entries
			.get(&key.to_ascii_lowercase())
			.map(|(_, v)| v.as_str())
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.entries.contains_key(&key.to_ascii_lowercase())
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.entries.values().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	/// Render as a CRLF-joined `Key: value` block, without a trailing
	/// blank line (the caller appends the final `\r\n\r\n`).
	pub fn to_wire(&self) -> String {
		self
			.iter()
			.map(|(k, v)| format!("{k}: {v}"))
			.collect::<Vec<_>>()
			.join("\r\n")
	}
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
	fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
		let mut headers = Headers::new();
		for (k, v) in iter {
			headers.insert(k, v);
		}
		headers
	}
}
