use std::borrow::Cow;
use std::fmt;
use std::slice::Iter;

/// An allocation-optimized string.
///
/// Metric names and tags are almost always string literals, so we accept
/// anything that converts into a copy-on-write string and only allocate for
/// dynamically-built names.
pub type SharedString = Cow<'static, str>;

/// A key/value pair attached to a metric name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    key: SharedString,
    value: SharedString,
}

impl Tag {
    /// Creates a `Tag` from a key and value.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<SharedString>,
        V: Into<SharedString>,
    {
        Tag { key: key.into(), value: value.into() }
    }

    /// The tag key.
    pub fn key(&self) -> &str {
        self.key.as_ref()
    }

    /// The tag value.
    pub fn value(&self) -> &str {
        self.value.as_ref()
    }
}

impl<K, V> From<(K, V)> for Tag
where
    K: Into<SharedString>,
    V: Into<SharedString>,
{
    fn from((key, value): (K, V)) -> Self {
        Tag::new(key, value)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// A metric name.
///
/// A name always includes a base string, and can optionally include tags used
/// to further describe the metric.  The registry keys metrics by the full
/// name-plus-tags combination, so `requests` and `requests{region=east}` are
/// distinct metrics.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MetricName {
    name: SharedString,
    tags: Vec<Tag>,
}

impl MetricName {
    /// Creates a `MetricName` from a bare name.
    pub fn from_name<N>(name: N) -> Self
    where
        N: Into<SharedString>,
    {
        MetricName { name: name.into(), tags: Vec::new() }
    }

    /// Creates a `MetricName` from a name and an iterator of tags.
    pub fn from_name_and_tags<N, T>(name: N, tags: T) -> Self
    where
        N: Into<SharedString>,
        T: IntoIterator,
        T::Item: Into<Tag>,
    {
        MetricName { name: name.into(), tags: tags.into_iter().map(Into::into).collect() }
    }

    /// The base name, without tags.
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// The tags attached to this name, in insertion order.
    pub fn tags(&self) -> Iter<'_, Tag> {
        self.tags.iter()
    }

    /// Appends a tag to this name.
    pub fn push_tag<T>(&mut self, tag: T)
    where
        T: Into<Tag>,
    {
        self.tags.push(tag.into());
    }
}

impl From<&'static str> for MetricName {
    fn from(name: &'static str) -> Self {
        MetricName::from_name(name)
    }
}

impl From<String> for MetricName {
    fn from(name: String) -> Self {
        MetricName::from_name(name)
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tags.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}{{", self.name)?;
            for (idx, tag) in self.tags.iter().enumerate() {
                if idx > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{}", tag)?;
            }
            write!(f, "}}")
        }
    }
}
