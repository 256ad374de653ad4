//! Property descriptors: one typed field of a document class.
//!
//! A [`Property`] validates and standardizes scalar values and carries the
//! relationship metadata ([`Relation`]) for reference fields. Reference
//! values are validated here only in their stored form (keys); checking that
//! a live document has the right class is the engine's job.

use serde_json::{Number, Value};

/// Custom validation hook applied to non-null values after the kind check.
pub type Validator = fn(&Value) -> bool;

/// The class a reference points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// The class being declared. Resolved during registration.
    SelfClass,
    Class(String),
}

impl Target {
    pub fn class(name: impl Into<String>) -> Self {
        Self::Class(name.into())
    }

    /// The resolved class name, `None` while still [`Target::SelfClass`].
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::SelfClass => None,
            Self::Class(name) => Some(name),
        }
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Self::Class(name.to_string())
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        Self::Class(name)
    }
}

/// Relationship metadata of a reference field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relation {
    pub target: Target,
    /// Name of the inverse collection synthesized on the target class.
    pub collection_name: Option<String>,
    /// When `false`, a reference to a document that does not exist in the
    /// store is skipped instead of failing.
    pub strict: bool,
}

impl Relation {
    fn new(target: Target) -> Self {
        Self {
            target,
            collection_name: None,
            strict: true,
        }
    }
}

/// Value kinds a property can hold.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyKind {
    Any,
    String,
    Integer,
    Float,
    Boolean,
    /// A JSON array, optionally with a typed element kind.
    List(Option<Box<PropertyKind>>),
    Dict,
    Reference(Relation),
    MultiReference(Relation),
}

impl PropertyKind {
    fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (Self::Any, _) => true,
            (Self::String, Value::String(_)) => true,
            (Self::Integer, Value::Number(n)) => n.is_i64() || n.is_u64() || integral_i64(n).is_some(),
            (Self::Integer, Value::String(s)) => s.trim().parse::<i64>().is_ok(),
            (Self::Float, Value::Number(_)) => true,
            (Self::Float, Value::String(s)) => s.trim().parse::<f64>().is_ok_and(f64::is_finite),
            (Self::Boolean, Value::Bool(_)) => true,
            (Self::List(None), Value::Array(_)) => true,
            (Self::List(Some(element)), Value::Array(items)) => {
                items.iter().all(|item| element.accepts(item))
            }
            (Self::Dict, Value::Object(_)) => true,
            (Self::Reference(_), Value::String(s)) => !s.is_empty(),
            (Self::MultiReference(_), Value::Array(items)) => items
                .iter()
                .all(|item| matches!(item, Value::String(s) if !s.is_empty())),
            _ => false,
        }
    }

    fn standardize(&self, value: Value) -> Value {
        match (self, value) {
            (Self::Integer, Value::Number(n)) if !(n.is_i64() || n.is_u64()) => {
                integral_i64(&n).map_or(Value::Number(n), Value::from)
            }
            (Self::Integer, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map_or(Value::String(s), Value::from),
            (Self::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map_or(Value::String(s), Value::Number),
            (Self::List(Some(element)), Value::Array(items)) => Value::Array(
                items.into_iter().map(|item| element.standardize(item)).collect(),
            ),
            (_, value) => value,
        }
    }
}

/// The exact `i64` a whole float denotes. Floats outside the `i64` range
/// have none.
fn integral_i64(n: &Number) -> Option<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    n.as_f64()
        .filter(|f| f.fract() == 0.0 && (-LIMIT..LIMIT).contains(f))
        .map(|f| f as i64)
}

/// One declared field of a document class.
#[derive(Clone, Debug)]
pub struct Property {
    kind: PropertyKind,
    unique: bool,
    required: bool,
    default: Option<Value>,
    validator: Option<Validator>,
    source_field: Option<String>,
}

impl Property {
    pub fn new(kind: PropertyKind) -> Self {
        Self {
            kind,
            unique: false,
            required: false,
            default: None,
            validator: None,
            source_field: None,
        }
    }

    pub fn any() -> Self {
        Self::new(PropertyKind::Any)
    }

    pub fn string() -> Self {
        Self::new(PropertyKind::String)
    }

    pub fn integer() -> Self {
        Self::new(PropertyKind::Integer)
    }

    pub fn float() -> Self {
        Self::new(PropertyKind::Float)
    }

    pub fn boolean() -> Self {
        Self::new(PropertyKind::Boolean)
    }

    pub fn list() -> Self {
        Self::new(PropertyKind::List(None))
    }

    /// A list whose elements are validated and standardized as `element`.
    pub fn list_of(element: PropertyKind) -> Self {
        Self::new(PropertyKind::List(Some(Box::new(element))))
    }

    pub fn dict() -> Self {
        Self::new(PropertyKind::Dict)
    }

    /// A single reference to a document of `target`.
    pub fn reference(target: impl Into<Target>) -> Self {
        Self::new(PropertyKind::Reference(Relation::new(target.into())))
    }

    /// A list of references to documents of `target`.
    pub fn multi_reference(target: impl Into<Target>) -> Self {
        Self::new(PropertyKind::MultiReference(Relation::new(target.into())))
    }

    /// A single reference to a document of the class being declared.
    pub fn self_reference() -> Self {
        Self::new(PropertyKind::Reference(Relation::new(Target::SelfClass)))
    }

    /// The inverse collection mirroring `source_class.source_field`.
    ///
    /// Inverse collections are never strict: an entry whose document is gone
    /// is skipped on read and dropped on the next save.
    pub(crate) fn inverse(source_class: &str, source_field: &str) -> Self {
        let mut property = Self::multi_reference(Target::class(source_class)).strict(false);
        property.source_field = Some(source_field.to_string());
        property
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Synthesize an inverse collection named `name` on the target class.
    /// No effect on non-reference properties.
    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        if let Some(relation) = self.relation_mut() {
            relation.collection_name = Some(name.into());
        }
        self
    }

    /// Set whether dangling targets are an error. No effect on non-reference
    /// properties.
    pub fn strict(mut self, strict: bool) -> Self {
        if let Some(relation) = self.relation_mut() {
            relation.strict = strict;
        }
        self
    }

    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn relation(&self) -> Option<&Relation> {
        match &self.kind {
            PropertyKind::Reference(relation) | PropertyKind::MultiReference(relation) => {
                Some(relation)
            }
            _ => None,
        }
    }

    pub(crate) fn relation_mut(&mut self) -> Option<&mut Relation> {
        match &mut self.kind {
            PropertyKind::Reference(relation) | PropertyKind::MultiReference(relation) => {
                Some(relation)
            }
            _ => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        self.relation().is_some()
    }

    /// `true` for multi-references, including inverse collections.
    pub fn is_multi_reference(&self) -> bool {
        matches!(self.kind, PropertyKind::MultiReference(_))
    }

    /// `true` for collections synthesized from another class's forward field.
    pub fn is_inverse(&self) -> bool {
        self.source_field.is_some()
    }

    /// The forward field this inverse collection mirrors.
    pub fn source_field(&self) -> Option<&str> {
        self.source_field.as_deref()
    }

    pub fn collection(&self) -> Option<&str> {
        self.relation()?.collection_name.as_deref()
    }

    /// The field on the other side that must be kept in sync with this one:
    /// the inverse collection of a forward field, or the forward field of an
    /// inverse collection.
    pub fn mirror_field(&self) -> Option<&str> {
        self.collection().or(self.source_field())
    }

    pub fn is_strict(&self) -> bool {
        self.relation().map_or(true, |r| r.strict)
    }

    /// Resolved target class of a reference property.
    pub fn reference_class(&self) -> Option<&str> {
        self.relation()?.target.name()
    }

    /// Whether `value` is acceptable for this property.
    pub fn validate(&self, value: &Value) -> bool {
        if !self.kind.accepts(value) {
            return false;
        }
        match (self.validator, value) {
            (_, Value::Null) | (None, _) => true,
            (Some(check), value) => check(value),
        }
    }

    /// Convert an accepted value into its canonical form.
    pub fn standardize(&self, value: Value) -> Value {
        self.kind.standardize(value)
    }

    /// Value a new document starts with.
    pub fn default_value(&self) -> Value {
        match (&self.default, &self.kind) {
            (Some(value), _) => value.clone(),
            (None, PropertyKind::MultiReference(_)) => Value::Array(Vec::new()),
            (None, _) => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn null_is_valid_for_every_kind() {
        for property in [
            Property::string(),
            Property::integer(),
            Property::list(),
            Property::reference("Page"),
            Property::multi_reference("Page"),
        ] {
            assert!(property.validate(&Value::Null));
        }
    }

    #[test]
    fn scalar_kinds() {
        assert!(Property::string().validate(&json!("x")));
        assert!(!Property::string().validate(&json!(1)));
        assert!(Property::boolean().validate(&json!(true)));
        assert!(!Property::boolean().validate(&json!("true")));
        assert!(Property::dict().validate(&json!({"a": 1})));
        assert!(!Property::dict().validate(&json!([1])));
        assert!(Property::any().validate(&json!([{"a": null}])));
    }

    #[test]
    fn integers_accept_integral_numbers_and_numeric_strings() {
        let p = Property::integer();
        assert!(p.validate(&json!(3)));
        assert!(p.validate(&json!(3.0)));
        assert!(p.validate(&json!("42")));
        assert!(!p.validate(&json!(3.5)));
        assert!(!p.validate(&json!("forty-two")));

        assert_eq!(p.standardize(json!(3.0)), json!(3));
        assert_eq!(p.standardize(json!(" 42 ")), json!(42));
        assert_eq!(p.standardize(json!(7)), json!(7));
    }

    #[test]
    fn integers_reject_floats_outside_i64() {
        let p = Property::integer();
        assert!(!p.validate(&json!(1e300)));
        assert!(!p.validate(&json!(-1e19)));
        assert!(!p.validate(&json!(9_223_372_036_854_775_808.0)));
        assert!(p.validate(&json!(-9_223_372_036_854_775_808.0)));
        assert_eq!(
            p.standardize(json!(-9_223_372_036_854_775_808.0)),
            json!(i64::MIN)
        );
        // left alone rather than saturated
        assert_eq!(p.standardize(json!(1e300)), json!(1e300));
    }

    proptest! {
        #[test]
        fn whole_floats_standardize_exactly_or_are_rejected(f in any::<f64>()) {
            let f = f.trunc();
            prop_assume!(f.is_finite());
            let p = Property::integer();
            let value = json!(f);
            if p.validate(&value) {
                let standardized = p.standardize(value);
                let int = standardized.as_i64();
                prop_assert!(int.is_some(), "{} standardized to {}", f, standardized);
                prop_assert_eq!(int.map(|i| i as f64), Some(f));
            } else {
                prop_assert!(f.abs() >= 9_223_372_036_854_775_808.0, "{} rejected", f);
            }
        }
    }

    #[test]
    fn floats_standardize_strings() {
        let p = Property::float();
        assert!(p.validate(&json!("2.5")));
        assert!(!p.validate(&json!("inf")));
        assert_eq!(p.standardize(json!("2.5")), json!(2.5));
    }

    #[test]
    fn typed_lists_convert_each_element() {
        let p = Property::list_of(PropertyKind::Integer);
        let input = json!(["1", "2", "3"]);
        assert!(p.validate(&input));
        assert_eq!(p.standardize(input), json!([1, 2, 3]));
        assert!(!p.validate(&json!(["1", "x"])));
    }

    #[test]
    fn reference_values_are_keys() {
        let single = Property::reference("Page");
        assert!(single.validate(&json!("p1")));
        assert!(!single.validate(&json!("")));
        assert!(!single.validate(&json!(5)));

        let multi = Property::multi_reference("Page");
        assert!(multi.validate(&json!(["a", "b"])));
        assert!(!multi.validate(&json!(["a", 1])));
    }

    #[test]
    fn custom_validator_runs_after_kind_check() {
        fn short(v: &Value) -> bool {
            v.as_str().is_some_and(|s| s.len() <= 3)
        }
        let p = Property::string().validator(short);
        assert!(p.validate(&json!("abc")));
        assert!(!p.validate(&json!("abcd")));
        assert!(p.validate(&Value::Null));
    }

    #[test]
    fn defaults() {
        assert_eq!(Property::string().default_value(), Value::Null);
        assert_eq!(Property::string().default("x").default_value(), json!("x"));
        assert_eq!(Property::multi_reference("A").default_value(), json!([]));
        assert_eq!(Property::reference("A").default_value(), Value::Null);
    }

    #[test]
    fn relation_metadata() {
        let p = Property::reference("Page").collection_name("users").strict(false);
        assert_eq!(p.reference_class(), Some("Page"));
        assert_eq!(p.collection(), Some("users"));
        assert_eq!(p.mirror_field(), Some("users"));
        assert!(!p.is_strict());
        assert!(!p.is_inverse());

        let inverse = Property::inverse("User", "page");
        assert!(inverse.is_inverse());
        assert!(inverse.is_multi_reference());
        assert_eq!(inverse.reference_class(), Some("User"));
        assert_eq!(inverse.mirror_field(), Some("page"));
        assert!(!inverse.is_strict());
    }

    #[test]
    fn relation_builders_ignore_scalars() {
        let p = Property::string().collection_name("nope").strict(false);
        assert!(p.relation().is_none());
        assert!(p.is_strict());
        assert!(p.collection().is_none());
    }

    #[test]
    fn self_reference_is_unresolved_until_registration() {
        let p = Property::self_reference();
        assert!(p.is_reference());
        assert_eq!(p.reference_class(), None);
    }
}
