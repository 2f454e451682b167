use indexmap::IndexMap;

/// One name/value pair inside a [`CookieJar`]. There is no path/domain
/// scoping here — attributes on the wire (`Path`, `Domain`, `Expires`, ...)
/// are discarded on parse and never consulted on lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Morsel {
	pub value: String,
}

impl Morsel {
	pub fn new(value: impl Into<String>) -> Self {
		Morsel { value: value.into() }
	}
}

/// Case-preserving `name -> Morsel` jar. Cookies never expire in memory
/// within a session.
#[derive(Clone, Debug, Default)]
pub struct CookieJar {
	morsels: IndexMap<String, Morsel>,
}

impl CookieJar {
	pub fn new() -> Self {
		Self::default()
	}

	/// Parse one `Set-Cookie` header value and load the name/value pair.
	/// Attributes (`Path=...; HttpOnly`, ...) are discarded.
	pub fn load(&mut self, set_cookie_line: &str) {
		if let Ok(parsed) = cookie::Cookie::parse(set_cookie_line.to_string()) {
			self
				.morsels
				.insert(parsed.name().to_string(), Morsel::new(parsed.value().to_string()));
		}
	}

	pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
		self.morsels.insert(name.into(), Morsel::new(value));
	}

	pub fn get(&self, name: &str) -> Option<&str> {
		self.morsels.get(name).map(|m| m.value.as_str())
	}

	/// Merge `other` into `self`, last-writer-wins on name collisions.
	pub fn update(&mut self, other: &CookieJar) {
		for (name, morsel) in &other.morsels {
			self.morsels.insert(name.clone(), morsel.clone());
		}
	}

	pub fn is_empty(&self) -> bool {
		self.morsels.is_empty()
	}

	pub fn len(&self) -> usize {
		self.morsels.len()
	}

	pub fn get_dict(&self) -> IndexMap<String, String> {
		self
			.morsels
			.iter()
			.map(|(k, v)| (k.clone(), v.value.clone()))
			.collect()
	}

	/// One `Cookie:` line with every morsel joined as `k=v; k=v;`.
	pub fn to_cookie_header(&self) -> Option<String> {
		if self.morsels.is_empty() {
			return None;
		}
		Some(
			self
				.morsels
				.iter()
				.map(|(k, v)| format!("{k}={};", v.value))
				.collect::<Vec<_>>()
				.join(" "),
		)
	}

	pub fn clear(&mut self) {
		self.morsels.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn loads_set_cookie_lines() {
		let mut jar = CookieJar::new();
		jar.load("k1=v1; Path=/; HttpOnly");
		jar.load("k2=v2");
		let dict = jar.get_dict();
		assert_eq!(dict.get("k1").map(String::as_str), Some("v1"));
		assert_eq!(dict.get("k2").map(String::as_str), Some("v2"));
	}

	#[test]
	fn update_is_last_writer_wins() {
		let mut jar = CookieJar::new();
		jar.set("k", "old");
		let mut incoming = CookieJar::new();
		incoming.set("k", "new");
		jar.update(&incoming);
		assert_eq!(jar.get("k"), Some("new"));
	}

	#[test]
	fn cookie_header_joins_all_morsels() {
		let mut jar = CookieJar::new();
		jar.set("a", "1");
		jar.set("b", "2");
		assert_eq!(jar.to_cookie_header().unwrap(), "a=1; b=2;");
	}
}
