/// Parameters of an XBDM line (e.g., `name="default.xex" base=0x82000000 stop`).
///
/// Keys are matched case-insensitively. Values may be quoted, in which case
/// they can contain spaces.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, Option<String>)>,
}

impl Params {
    /// Parses the parameters of the given line.
    pub fn parse(line: &str) -> Self {
        let mut entries = Vec::new();
        let mut rest = line.trim_start();

        while !rest.is_empty() {
            let key_end = rest.find(['=', ' ']).unwrap_or(rest.len());
            let key = rest[..key_end].to_ascii_lowercase();
            rest = &rest[key_end..];

            let value = if let Some(after_eq) = rest.strip_prefix('=') {
                if let Some(quoted) = after_eq.strip_prefix('"') {
                    let end = quoted.find('"').unwrap_or(quoted.len());
                    rest = quoted.get(end + 1..).unwrap_or_default();
                    Some(quoted[..end].to_owned())
                } else {
                    let end = after_eq.find(' ').unwrap_or(after_eq.len());
                    rest = &after_eq[end..];
                    Some(after_eq[..end].to_owned())
                }
            } else {
                None
            };

            if !key.is_empty() {
                entries.push((key, value));
            }
            rest = rest.trim_start();
        }

        Self { entries }
    }

    /// Returns the value of the given key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .and_then(|(_, v)| v.as_deref())
    }

    /// Returns the value of the given key, as an integer.
    ///
    /// Both hexadecimal (`0x` prefixed) and decimal values are accepted.
    pub fn get_u32(&self, key: &str) -> Option<u32> {
        let value = self.get(key)?;

        match value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
        {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => value.parse().ok(),
        }
    }

    /// Returns whether the given key is present.
    pub fn has(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k.eq_ignore_ascii_case(key))
    }
}

/// Returns the raw text following `key=` in the given line.
///
/// Used for string payloads that are not quoted and extend to the end of the
/// line (e.g., `debugstr ... string=Hello world`).
pub fn trailing_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("{key}=");

    let mut search = line;
    let mut offset = 0;
    while let Some(pos) = search.find(&pattern) {
        let start = offset + pos;
        if start == 0 || line.as_bytes()[start - 1] == b' ' {
            return Some(&line[start + pattern.len()..]);
        }
        offset = start + pattern.len();
        search = &line[offset..];
    }

    None
}
