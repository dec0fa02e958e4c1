//! Routing data models.
//!
//! `ResourceKey` names a registered data source; `RoutingContext` carries
//! everything a routing strategy may inspect for a single acquisition.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;

/// Identifier of a data source.
///
/// Keys compare by their string id. The empty id is the unique
/// [`ResourceKey::DEFAULT`] sentinel naming the unnamed/fallback data source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(Cow<'static, str>);

impl ResourceKey {
    /// The unnamed data source.
    pub const DEFAULT: ResourceKey = ResourceKey(Cow::Borrowed(""));

    /// Create a key. An empty id yields [`ResourceKey::DEFAULT`].
    pub fn new(id: impl Into<Cow<'static, str>>) -> Self {
        let id = id.into();
        if id.is_empty() {
            Self::DEFAULT
        } else {
            Self(id)
        }
    }

    /// Create a key from a static string, usable in `const` contexts.
    pub const fn from_static(id: &'static str) -> Self {
        Self(Cow::Borrowed(id))
    }

    pub fn id(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ResourceKey {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<&str> for ResourceKey {
    fn from(id: &str) -> Self {
        Self::new(id.to_owned())
    }
}

impl From<String> for ResourceKey {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_default() {
            write!(f, "<default>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Execution context handed to routing strategies.
///
/// Bundles an opaque correlation object with the SQL text, named parameters
/// and positional arguments of the pending work. Every part is optional.
///
/// # Example
///
/// ```
/// use sql_director::models::RoutingContext;
///
/// let tenant = 7_u32;
/// let ctx = RoutingContext::with_data(&tenant).with_sql("SELECT 1");
/// assert_eq!(ctx.data::<u32>(), Some(&7));
/// assert_eq!(ctx.sql(), Some("SELECT 1"));
/// ```
#[derive(Clone, Copy, Default)]
pub struct RoutingContext<'a> {
    data: Option<&'a (dyn Any + Send + Sync)>,
    sql: Option<&'a str>,
    params: Option<&'a HashMap<String, Value>>,
    args: &'a [Value],
}

impl<'a> RoutingContext<'a> {
    /// Context carrying nothing; every strategy sees empty inputs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context carrying an opaque correlation object.
    pub fn with_data<T: Any + Send + Sync>(data: &'a T) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn with_sql(mut self, sql: &'a str) -> Self {
        self.sql = Some(sql);
        self
    }

    pub fn with_params(mut self, params: &'a HashMap<String, Value>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_args(mut self, args: &'a [Value]) -> Self {
        self.args = args;
        self
    }

    /// Correlation object, if it is a `T`.
    pub fn data<T: Any>(&self) -> Option<&'a T> {
        self.data.and_then(|data| data.downcast_ref::<T>())
    }

    pub fn raw_data(&self) -> Option<&'a (dyn Any + Send + Sync)> {
        self.data
    }

    pub fn sql(&self) -> Option<&'a str> {
        self.sql
    }

    pub fn params(&self) -> Option<&'a HashMap<String, Value>> {
        self.params
    }

    /// Named parameter by name.
    pub fn param(&self, name: &str) -> Option<&'a Value> {
        self.params.and_then(|params| params.get(name))
    }

    pub fn args(&self) -> &'a [Value] {
        self.args
    }
}

impl std::fmt::Debug for RoutingContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingContext")
            .field("has_data", &self.data.is_some())
            .field("sql", &self.sql)
            .field("params", &self.params)
            .field("args", &self.args)
            .finish()
    }
}
