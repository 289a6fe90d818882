use serde::{Serialize, Serializer};
use std::fmt;

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// A named field of a record, composite or group item.
    Name(String),
    /// A repetition of a group.
    Index(usize),
}

/// The name-path of a node within a record, e.g. `bounds.top` or `strings[2]`.
///
/// The textual form separates names with `.` and writes group items as `[n]`; a bare numeric
/// segment (`strings.2`) is read as an index too. Field names never contain `.`, `[` or `]`,
/// templates reject them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FieldPath(Vec<Segment>);

impl FieldPath {
    /// The path of the record itself.
    pub fn root() -> Self {
        FieldPath(Vec::new())
    }

    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Name(name.to_owned()));
        FieldPath(segments)
    }

    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Index(index));
        FieldPath(segments)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The path without its last segment, or `None` for the root.
    pub fn parent(&self) -> Option<FieldPath> {
        let (_, init) = self.0.split_last()?;
        Some(FieldPath(init.to_vec()))
    }

    /// The last segment, if it is a name.
    pub fn name(&self) -> Option<&str> {
        match self.0.last() {
            Some(Segment::Name(name)) => Some(name),
            _ => None,
        }
    }

    fn parse(s: &str) -> Self {
        let mut segments = Vec::new();
        for part in s.split('.').filter(|p| !p.is_empty()) {
            let (name, mut rest) = match part.find('[') {
                Some(i) => (&part[..i], &part[i..]),
                None => (part, ""),
            };

            if !name.is_empty() {
                match name.parse::<usize>() {
                    Ok(i) => segments.push(Segment::Index(i)),
                    Err(_) => segments.push(Segment::Name(name.to_owned())),
                }
            }

            while let Some(stripped) = rest.strip_prefix('[') {
                let (inner, tail) = match stripped.find(']') {
                    Some(end) => (&stripped[..end], &stripped[end + 1..]),
                    None => (stripped, ""),
                };
                match inner.trim().parse::<usize>() {
                    Ok(i) => segments.push(Segment::Index(i)),
                    // Not an index; resolving it will report an unknown path.
                    Err(_) => segments.push(Segment::Name(format!("[{inner}]"))),
                }
                rest = tail;
            }
        }
        FieldPath(segments)
    }
}

impl From<&str> for FieldPath {
    fn from(s: &str) -> Self {
        FieldPath::parse(s)
    }
}

impl From<String> for FieldPath {
    fn from(s: String) -> Self {
        FieldPath::parse(&s)
    }
}

impl From<&FieldPath> for FieldPath {
    fn from(p: &FieldPath) -> Self {
        p.clone()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<record>");
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Name(name) if i == 0 => f.write_str(name)?,
                Segment::Name(name) => write!(f, ".{name}")?,
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_names_and_indices() {
        let path = FieldPath::from("entries[2].name");
        assert_eq!(
            path.segments(),
            &[
                Segment::Name("entries".to_owned()),
                Segment::Index(2),
                Segment::Name("name".to_owned()),
            ]
        );
        assert_eq!(FieldPath::from("entries.2.name"), path);
        assert_eq!(path.to_string(), "entries[2].name");
    }

    #[test]
    fn test_names_with_spaces_survive() {
        let path = FieldPath::from("Number of strings");
        assert_eq!(path.name(), Some("Number of strings"));
    }

    #[test]
    fn test_nested_indices() {
        let path = FieldPath::from("rows[1][3]");
        assert_eq!(path.to_string(), "rows[1][3]");
        assert_eq!(path.parent().unwrap().to_string(), "rows[1]");
    }

    #[test]
    fn test_root() {
        assert!(FieldPath::from("").is_root());
        assert_eq!(FieldPath::root().to_string(), "<record>");
        assert_eq!(FieldPath::root().parent(), None);
    }
}
