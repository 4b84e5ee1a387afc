mod header_name;
mod header_value;
mod header_values;
mod known_header_name;
mod unknown_header_name;

pub use header_name::HeaderName;
pub use header_value::HeaderValue;
pub use header_values::HeaderValues;
pub use known_header_name::KnownHeaderName;

use header_name::HeaderNameInner;
use unknown_header_name::UnknownHeaderName;
use std::fmt::{self, Display, Formatter};

/// An ordered, case-insensitive multimap of header names to values.
///
/// Iteration yields names in first-insertion order; repeated values
/// for one name keep their append order. Lookup by
/// [`KnownHeaderName`] avoids string comparison entirely.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[must_use]
pub struct Headers {
    entries: Vec<(HeaderName<'static>, HeaderValues)>,
}

#[cfg(feature = "serde")]
impl serde::Serialize for Headers {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, values) in self {
            map.serialize_entry(&key.to_string(), values)?;
        }
        map.end()
    }
}

impl Display for Headers {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (n, v) in self {
            for v in v {
                f.write_fmt(format_args!("{n}: {v}\r\n"))?;
            }
        }
        Ok(())
    }
}

impl Headers {
    /// Construct a new empty header map
    pub fn new() -> Self {
        Self::default()
    }

    /// Return an iterator over borrowed header names and header
    /// values, in first-insertion order.
    pub fn iter(&self) -> Iter<'_> {
        Iter(self.entries.iter())
    }

    /// Are there zero headers?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many unique [`HeaderName`]s have been added to these
    /// [`Headers`]? Note that each header name may have more than one
    /// [`HeaderValue`].
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn position(&self, name: &HeaderName<'_>) -> Option<usize> {
        match &name.0 {
            HeaderNameInner::KnownHeader(known) => self
                .entries
                .iter()
                .position(|(n, _)| matches!(&n.0, HeaderNameInner::KnownHeader(k) if k == known)),
            HeaderNameInner::UnknownHeader(_) => {
                self.entries.iter().position(|(n, _)| n == name)
            }
        }
    }

    /// Add the header value or values into this header map. If there
    /// is already a header with the same name, the new values are
    /// added after the existing ones and the name keeps its original
    /// position. To replace any existing values, use
    /// [`Headers::insert`].
    pub fn append(
        &mut self,
        name: impl Into<HeaderName<'static>>,
        values: impl Into<HeaderValues>,
    ) {
        let name = name.into();
        match self.position(&name) {
            Some(index) => self.entries[index].1.extend(values.into()),
            None => self.entries.push((name, values.into())),
        }
    }

    /// A slightly more efficient way to combine two [`Headers`] than
    /// using [`Extend`]
    pub fn append_all(&mut self, other: Headers) {
        for (name, values) in other.entries {
            self.append(name, values);
        }
    }

    /// Combine two [`Headers`], replacing any existing header values
    pub fn insert_all(&mut self, other: Headers) {
        for (name, values) in other.entries {
            self.insert(name, values);
        }
    }

    /// Add a header value or header values into this header map. If a
    /// header already exists with the same name, it is replaced in
    /// place. To combine, see [`Headers::append`].
    pub fn insert(
        &mut self,
        name: impl Into<HeaderName<'static>>,
        values: impl Into<HeaderValues>,
    ) {
        let name = name.into();
        match self.position(&name) {
            Some(index) => self.entries[index].1 = values.into(),
            None => self.entries.push((name, values.into())),
        }
    }

    /// Add a header value or header values into this header map if
    /// and only if there is not already a header with the same name.
    pub fn try_insert(
        &mut self,
        name: impl Into<HeaderName<'static>>,
        values: impl Into<HeaderValues>,
    ) {
        let name = name.into();
        if self.position(&name).is_none() {
            self.entries.push((name, values.into()));
        }
    }

    /// If the name does not exist already, execute the provided
    /// function and insert its value
    pub fn try_insert_with<V>(
        &mut self,
        name: impl Into<HeaderName<'static>>,
        values: impl FnOnce() -> V,
    ) where
        V: Into<HeaderValues>,
    {
        let name = name.into();
        if self.position(&name).is_none() {
            self.entries.push((name, values().into()));
        }
    }

    /// Retrieves a &str header value if there is at least one header
    /// in the map with this name. If there are several headers with
    /// the same name, this follows the behavior defined at
    /// [`HeaderValues::one`]. Returns None if there is no header with
    /// the provided header name.
    pub fn get_str<'a>(&self, name: impl Into<HeaderName<'a>>) -> Option<&str> {
        self.get_values(name).and_then(HeaderValues::as_str)
    }

    /// Retrieves a singular header value from this header map. If
    /// there are several headers with the same name, this follows the
    /// behavior defined at [`HeaderValues::one`].
    pub fn get<'a>(&self, name: impl Into<HeaderName<'a>>) -> Option<&HeaderValue> {
        self.get_values(name).and_then(HeaderValues::one)
    }

    /// Retrieves a reference to all header values with the provided
    /// header name. If you expect there to be only one value, use
    /// [`Headers::get`].
    pub fn get_values<'a>(&self, name: impl Into<HeaderName<'a>>) -> Option<&HeaderValues> {
        let name = name.into();
        self.position(&name).map(|index| &self.entries[index].1)
    }

    /// The single logical value for this name: repeated occurrences
    /// combined into one comma-joined string per RFC 7230 §3.2, in
    /// wire order. Returns None when the header is absent or any
    /// value is not utf8.
    pub fn folded<'a>(&self, name: impl Into<HeaderName<'a>>) -> Option<String> {
        self.get_values(name).and_then(HeaderValues::folded)
    }

    /// Takes all headers with the provided header name out of this
    /// header map and returns them. Returns None if the header did
    /// not have an entry in this map.
    pub fn remove<'a>(&mut self, name: impl Into<HeaderName<'a>>) -> Option<HeaderValues> {
        let name = name.into();
        self.position(&name)
            .map(|index| self.entries.remove(index).1)
    }

    /// remove multiple headers by name
    pub fn remove_all<'a, I, H>(&mut self, names: I)
    where
        I: IntoIterator<Item = H>,
        H: Into<HeaderName<'a>>,
    {
        for name in names {
            self.remove(name);
        }
    }

    /// Predicate function to check whether this header map contains
    /// the provided header name. If you are using this to
    /// conditionally insert a value, consider using
    /// [`Headers::try_insert`] instead.
    pub fn has_header<'a>(&self, name: impl Into<HeaderName<'a>>) -> bool {
        let name = name.into();
        self.position(&name).is_some()
    }

    /// Convenience function to check whether the value contained in
    /// this header map for the provided name is
    /// ascii-case-insensitively equal to the provided comparison
    /// &str. Returns false if there is no value for the name.
    pub fn eq_ignore_ascii_case<'a>(
        &'a self,
        name: impl Into<HeaderName<'a>>,
        needle: &str,
    ) -> bool {
        self.get_str(name)
            .is_some_and(|v| v.eq_ignore_ascii_case(needle))
    }

    /// Convenience function to check whether any comma-separated
    /// element of the value for this name matches the needle,
    /// ascii-case-insensitively. Useful for headers like `Connection`
    /// and `Transfer-Encoding` that carry token lists.
    pub fn contains_token<'a>(&self, name: impl Into<HeaderName<'a>>, needle: &str) -> bool {
        self.get_values(name).is_some_and(|values| {
            values.iter().filter_map(HeaderValue::as_str).any(|value| {
                value
                    .split(',')
                    .any(|token| token.trim().eq_ignore_ascii_case(needle))
            })
        })
    }

    /// Chainable method to insert a header
    pub fn with_inserted_header(
        mut self,
        name: impl Into<HeaderName<'static>>,
        values: impl Into<HeaderValues>,
    ) -> Self {
        self.insert(name, values);
        self
    }

    /// Chainable method to append a header
    pub fn with_appended_header(
        mut self,
        name: impl Into<HeaderName<'static>>,
        values: impl Into<HeaderValues>,
    ) -> Self {
        self.append(name, values);
        self
    }

    /// Chainable method to remove a header
    pub fn without_header<'a>(mut self, name: impl Into<HeaderName<'a>>) -> Self {
        self.remove(name);
        self
    }

    /// Chainable method to remove multiple headers by name
    pub fn without_headers<'a, I, H>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<HeaderName<'a>>,
    {
        self.remove_all(names);
        self
    }
}

impl<HN, HV> Extend<(HN, HV)> for Headers
where
    HN: Into<HeaderName<'static>>,
    HV: Into<HeaderValues>,
{
    fn extend<T: IntoIterator<Item = (HN, HV)>>(&mut self, iter: T) {
        for (name, values) in iter {
            self.append(name, values);
        }
    }
}

impl<HN, HV> FromIterator<(HN, HV)> for Headers
where
    HN: Into<HeaderName<'static>>,
    HV: Into<HeaderValues>,
{
    fn from_iter<T: IntoIterator<Item = (HN, HV)>>(iter: T) -> Self {
        let mut headers = Self::new();
        for (name, values) in iter {
            headers.append(name, values);
        }
        headers
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a HeaderName<'static>, &'a HeaderValues);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Borrowing iterator over headers in first-insertion order
#[derive(Debug)]
pub struct Iter<'a>(std::slice::Iter<'a, (HeaderName<'static>, HeaderValues)>);

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a HeaderName<'static>, &'a HeaderValues);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(name, values)| (name, values))
    }
}

impl IntoIterator for Headers {
    type Item = (HeaderName<'static>, HeaderValues);
    type IntoIter = std::vec::IntoIter<(HeaderName<'static>, HeaderValues)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
