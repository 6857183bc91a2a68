//! Schema documents: named types declared in JSON instead of Rust.
//!
//! ```json
//! {
//!     "root": "Item",
//!     "types": {
//!         "Item": {"union": ["Story", "Comment"]},
//!         "Story": {"record": {"fields": {"type": "string", "title": "string"},
//!                              "expect": {"type": "story"}}},
//!         "Comment": {"record": {"fields": {"type": "string", "kids": {"list": "int"}},
//!                                "expect": {"type": "comment"}}}
//!     }
//! }
//! ```
//!
//! Every compiled descriptor produces normalized JSON, so a schema is fitted
//! with [`crate::Fitter::fit_descriptor`].
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::classify::{check_members, check_productive};
use crate::descriptor::{
    erase, hook, into_json, unerase, Alternative, EnumMember, EnumShape, Erased, FieldBinding,
    FieldDefault, FieldDescriptor, FieldValues, HookError, Kind, MappingShape, NarrowShape,
    OptionalShape, PrimitiveKind, RecordShape, Rejection, SequenceShape, Slot, TypeDescriptor,
    TypeRef, UnionShape,
};
use crate::error::{ClassifyError, SchemaError};
use crate::fitter::json_eq;
use crate::narrows::{from_unix_seconds, parse_date, parse_datetime};
use crate::path_de::{from_str_with_path, from_value_with_path};

// ------------------------------- Document -------------------------------- //

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Document {
    #[serde(default)]
    root: Option<String>,
    types: IndexMap<String, TypeExpr>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TypeExpr {
    Named(String),
    Compound(Box<Compound>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Compound {
    List(TypeExpr),
    Map(TypeExpr),
    Optional(TypeExpr),
    Union(Vec<TypeExpr>),
    Enum(IndexMap<String, Value>),
    Literal(Vec<Value>),
    Record(RecordExpr),
    Narrow(NarrowName),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecordExpr {
    fields: IndexMap<String, FieldExpr>,
    #[serde(default)]
    expect: IndexMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FieldExpr {
    Full(FieldSpec),
    Short(TypeExpr),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldSpec {
    #[serde(rename = "type")]
    ty: TypeExpr,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    default: Option<Value>,
    #[serde(default)]
    context: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum NarrowName {
    Date,
    Datetime,
    Timestamp,
}

// -------------------------------- Schema --------------------------------- //

/// A compiled schema document.
#[derive(Debug)]
pub struct Schema {
    root: Option<String>,
    types: IndexMap<String, Arc<TypeDescriptor>>,
    /// Descriptors of reserved names referenced as the root.
    builtins: HashMap<String, Arc<TypeDescriptor>>,
}

impl Schema {
    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        let document: Document = from_value_with_path(value)?;
        Ok(Self::compile(document)?)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TypeDescriptor>> {
        self.types.get(name).or_else(|| self.builtins.get(name))
    }

    /// The declared root type, if the document names one.
    pub fn root(&self) -> Option<&Arc<TypeDescriptor>> {
        self.root.as_deref().and_then(|name| self.get(name))
    }

    pub fn root_name(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// `name`, or the root when `None`.
    pub fn resolve(&self, name: Option<&str>) -> Result<&Arc<TypeDescriptor>, ClassifyError> {
        let name = match name.or(self.root.as_deref()) {
            Some(name) => name,
            None => {
                return Err(ClassifyError::UnresolvableType {
                    name: "<root>".to_string(),
                });
            }
        };
        self.get(name)
            .ok_or_else(|| ClassifyError::UnresolvableType {
                name: name.to_string(),
            })
    }

    /// Declared types in document order.
    pub fn types(&self) -> impl Iterator<Item = (&str, &Arc<TypeDescriptor>)> {
        self.types.iter().map(|(name, ty)| (name.as_str(), ty))
    }

    fn compile(document: Document) -> Result<Self, ClassifyError> {
        let mut compiler = Compiler::default();
        for name in document.types.keys() {
            if is_reserved(name) {
                return Err(ClassifyError::unsupported(name, "name is reserved for a built-in type"));
            }
            compiler
                .slots
                .insert(name.clone(), Arc::new(OnceLock::new()));
        }

        let mut types = IndexMap::with_capacity(document.types.len());
        for (name, expr) in &document.types {
            let described = Arc::new(compiler.declared(name, expr)?);
            if let Some(slot) = compiler.slots.get(name) {
                let _ = slot.set(Arc::downgrade(&described));
            }
            types.insert(name.clone(), described);
        }
        for described in types.values() {
            check_productive(described)?;
        }

        let mut builtins = HashMap::new();
        if let Some(root) = &document.root {
            if !types.contains_key(root) {
                let builtin = builtin(root).ok_or_else(|| ClassifyError::UnresolvableType {
                    name: root.clone(),
                })?;
                builtins.insert(root.clone(), Arc::new(builtin));
            }
        }

        Ok(Schema {
            root: document.root,
            types,
            builtins,
        })
    }
}

impl FromStr for Schema {
    type Err = SchemaError;

    fn from_str(src: &str) -> Result<Self, Self::Err> {
        let document: Document = from_str_with_path(src)?;
        Ok(Self::compile(document)?)
    }
}

fn is_reserved(name: &str) -> bool {
    name == "any" || PrimitiveKind::from_name(name).is_some()
}

fn builtin(name: &str) -> Option<TypeDescriptor> {
    match name {
        "any" => Some(TypeDescriptor::new("any", Kind::Any)),
        _ => PrimitiveKind::from_name(name).map(TypeDescriptor::primitive),
    }
}

// ------------------------------- Compiler -------------------------------- //

/// Every hook below produces a [`Value`].
#[derive(Default)]
struct Compiler {
    slots: HashMap<String, Slot>,
}

impl Compiler {
    /// Descriptor of a top-level declaration.
    fn declared(&self, name: &str, expr: &TypeExpr) -> Result<TypeDescriptor, ClassifyError> {
        match expr {
            // An alias is a narrow that passes its source value through.
            TypeExpr::Named(target) => {
                let shape = NarrowShape {
                    source: self.reference(target)?,
                    wrap: to_json(),
                    widen: None,
                };
                Ok(TypeDescriptor::new(name, Kind::Narrow(shape)))
            }
            TypeExpr::Compound(compound) => self.compound(name, compound),
        }
    }

    fn reference(&self, name: &str) -> Result<TypeRef, ClassifyError> {
        if let Some(builtin) = builtin(name) {
            return Ok(TypeRef::ready(Arc::new(builtin)));
        }
        self.slots
            .get(name)
            .map(|slot| TypeRef::deferred(name, slot.clone()))
            .ok_or_else(|| ClassifyError::UnresolvableType {
                name: name.to_string(),
            })
    }

    fn expr(&self, expr: &TypeExpr) -> Result<TypeRef, ClassifyError> {
        match expr {
            TypeExpr::Named(name) => self.reference(name),
            TypeExpr::Compound(compound) => {
                let name = compound_name(compound);
                Ok(TypeRef::ready(Arc::new(self.compound(&name, compound)?)))
            }
        }
    }

    fn compound(&self, name: &str, compound: &Compound) -> Result<TypeDescriptor, ClassifyError> {
        let kind = match compound {
            Compound::List(item) => Kind::Sequence(SequenceShape {
                item: self.expr(item)?,
                collect: hook(|items: Vec<Erased>| {
                    let items = items.into_iter().map(into_json).collect::<Result<Vec<_>, _>>()?;
                    Ok(erase(Value::Array(items)))
                }),
                items: None,
            }),
            Compound::Map(value) => Kind::Mapping(MappingShape {
                value: self.expr(value)?,
                collect: hook(|entries: IndexMap<String, Erased>| {
                    let mut out = Map::new();
                    for (key, value) in entries {
                        out.insert(key, into_json(value)?);
                    }
                    Ok(erase(Value::Object(out)))
                }),
                entries: None,
            }),
            Compound::Optional(inner) => Kind::Optional(OptionalShape {
                inner: self.expr(inner)?,
                wrap: hook(|fitted: Option<Erased>| match fitted {
                    Some(inner) => into_json(inner).map(erase),
                    None => Ok(erase(Value::Null)),
                }),
                peek: None,
            }),
            Compound::Union(alternatives) => {
                if alternatives.is_empty() {
                    return Err(ClassifyError::unsupported(name, "union has no alternatives"));
                }
                let alternatives = alternatives
                    .iter()
                    .map(|alternative| {
                        Ok(Alternative {
                            ty: self.expr(alternative)?,
                            wrap: to_json(),
                            peek: None,
                        })
                    })
                    .collect::<Result<Vec<_>, ClassifyError>>()?;
                Kind::Union(UnionShape { alternatives })
            }
            Compound::Enum(members) => {
                let members: Vec<EnumMember> = members
                    .iter()
                    .map(|(name, raw)| EnumMember {
                        name: name.clone(),
                        raw: raw.clone(),
                    })
                    .collect();
                check_members(name, &members)?;
                let names: Vec<Value> = members.iter().map(|m| Value::String(m.name.clone())).collect();
                Kind::Enumeration(enumeration(members, names))
            }
            Compound::Literal(raws) => {
                let members: Vec<EnumMember> = raws
                    .iter()
                    .map(|raw| EnumMember {
                        name: raw.to_string(),
                        raw: raw.clone(),
                    })
                    .collect();
                check_members(name, &members)?;
                Kind::Enumeration(enumeration(members, raws.clone()))
            }
            Compound::Record(record) => Kind::Record(self.record(name, record)?),
            Compound::Narrow(narrow) => Kind::Narrow(narrow_shape(*narrow)),
        };
        Ok(TypeDescriptor::new(name, kind))
    }

    fn record(&self, name: &str, record: &RecordExpr) -> Result<RecordShape, ClassifyError> {
        let mut fields = Vec::with_capacity(record.fields.len());
        for (field_name, field) in &record.fields {
            let binding = match field {
                FieldExpr::Short(ty) => FieldBinding::Input {
                    ty: self.expr(ty)?,
                    source: None,
                    default: None,
                },
                FieldExpr::Full(full) => match (&full.context, &full.from, &full.default) {
                    (Some(key), None, None) => FieldBinding::Context {
                        key: key.clone(),
                        ty: self.expr(&full.ty)?,
                    },
                    (Some(_), _, _) => {
                        let reason = format!("context field `{field_name}` cannot have a source or a default");
                        return Err(ClassifyError::unsupported(name, reason));
                    }
                    (None, source, default) => FieldBinding::Input {
                        ty: self.expr(&full.ty)?,
                        source: source.clone(),
                        default: default.clone().map(FieldDefault::Json),
                    },
                },
            };
            let field = FieldDescriptor {
                name: field_name.clone(),
                binding,
                get: None,
            };
            if let Some(key) = field.input_key() {
                if fields.iter().any(|f: &FieldDescriptor| f.input_key() == Some(key)) {
                    let reason = format!("input key `{key}` is read by two fields");
                    return Err(ClassifyError::unsupported(name, reason));
                }
            }
            fields.push(field);
        }

        for field in record.expect.keys() {
            if !record.fields.contains_key(field) {
                let reason = format!("`expect` names the undeclared field `{field}`");
                return Err(ClassifyError::unsupported(name, reason));
            }
        }
        let expect = record.expect.clone();
        Ok(RecordShape {
            fields,
            construct: hook(move |values: FieldValues| {
                let mut out = Map::new();
                for (field, value) in values.into_values() {
                    out.insert(field, into_json(value)?);
                }
                check_expected(&expect, &out)?;
                Ok(erase(Value::Object(out)))
            }),
        })
    }
}

fn to_json() -> crate::descriptor::Hook<Erased> {
    hook(|fitted: Erased| into_json(fitted).map(erase))
}

/// An enumeration yielding `outputs[i]` for the `i`-th member.
fn enumeration(members: Vec<EnumMember>, outputs: Vec<Value>) -> EnumShape {
    EnumShape {
        members,
        pick: hook(move |index: usize| {
            outputs
                .get(index)
                .cloned()
                .map(erase)
                .ok_or(HookError::Erasure {
                    expected: "enumeration member",
                })
        }),
        index_of: None,
    }
}

fn check_expected(expect: &IndexMap<String, Value>, fitted: &Map<String, Value>) -> Result<(), Rejection> {
    for (field, wanted) in expect {
        match fitted.get(field) {
            Some(found) if json_eq(found, wanted) => {}
            Some(found) => {
                return Err(Rejection::new(format!(
                    "`{field}` is {found}, expected {wanted}"
                )));
            }
            None => return Err(Rejection::new(format!("`{field}` is missing, expected {wanted}"))),
        }
    }
    Ok(())
}

fn narrow_shape(narrow: NarrowName) -> NarrowShape {
    let (source, wrap) = match narrow {
        NarrowName::Date => (
            PrimitiveKind::String,
            hook(|fitted: Erased| {
                let date = parse_date(&unerase::<String>(fitted)?)?;
                Ok(erase(Value::String(date.format("%Y-%m-%d").to_string())))
            }),
        ),
        NarrowName::Datetime => (
            PrimitiveKind::String,
            hook(|fitted: Erased| {
                let datetime = parse_datetime(&unerase::<String>(fitted)?)?;
                Ok(erase(Value::String(datetime.to_rfc3339())))
            }),
        ),
        NarrowName::Timestamp => (
            PrimitiveKind::Int,
            hook(|fitted: Erased| {
                let datetime = from_unix_seconds(unerase::<i64>(fitted)?)?;
                Ok(erase(Value::String(datetime.to_rfc3339())))
            }),
        ),
    };
    NarrowShape {
        source: TypeRef::ready(Arc::new(TypeDescriptor::primitive(source))),
        wrap,
        widen: None,
    }
}

/// Display name of an inline type, e.g. `list<Story>`.
fn compound_name(compound: &Compound) -> String {
    fn expr_name(expr: &TypeExpr) -> String {
        match expr {
            TypeExpr::Named(name) => name.clone(),
            TypeExpr::Compound(compound) => compound_name(compound),
        }
    }
    match compound {
        Compound::List(item) => format!("list<{}>", expr_name(item)),
        Compound::Map(value) => format!("map<string, {}>", expr_name(value)),
        Compound::Optional(inner) => format!("optional<{}>", expr_name(inner)),
        Compound::Union(alternatives) => {
            let names: Vec<String> = alternatives.iter().map(expr_name).collect();
            format!("union<{}>", names.join(" | "))
        }
        Compound::Enum(members) => {
            let names: Vec<&str> = members.keys().map(String::as_str).collect();
            format!("enum<{}>", names.join(", "))
        }
        Compound::Literal(raws) => {
            let raws: Vec<String> = raws.iter().map(Value::to_string).collect();
            format!("literal<{}>", raws.join(", "))
        }
        Compound::Record(record) => {
            let names: Vec<&str> = record.fields.keys().map(String::as_str).collect();
            format!("record<{}>", names.join(", "))
        }
        Compound::Narrow(NarrowName::Date) => "date".to_string(),
        Compound::Narrow(NarrowName::Datetime) => "datetime".to_string(),
        Compound::Narrow(NarrowName::Timestamp) => "timestamp".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::fitter::Fitter;
    use crate::node::FitIssue;
    use serde_json::json;

    fn schema(document: Value) -> Schema {
        Schema::from_value(document).unwrap()
    }

    #[test]
    fn records_normalize_enums_defaults_and_renames() {
        let schema = schema(json!({
            "root": "User",
            "types": {
                "Role": {"enum": {"ADMIN": 1, "GUEST": 2}},
                "User": {"record": {"fields": {
                    "name": {"type": "string", "from": "login"},
                    "role": "Role",
                    "tags": {"type": {"list": "string"}, "default": []},
                    "seen": {"type": {"optional": {"narrow": "date"}}}
                }}}
            }
        }));
        let root = schema.root().unwrap();
        let fitted = Fitter::new()
            .fit_descriptor(root, &json!({"login": "ada", "role": 1.0, "seen": "2024-01-02T03:04:05Z"}), &Context::default())
            .unwrap();
        assert_eq!(
            fitted,
            json!({"name": "ada", "role": "ADMIN", "tags": [], "seen": "2024-01-02"})
        );
    }

    #[test]
    fn forward_and_recursive_references_resolve() {
        let schema = schema(json!({
            "root": "Tree",
            "types": {
                "Tree": {"record": {"fields": {"value": "int", "children": {"list": "Tree"}}}}
            }
        }));
        let input = json!({"value": 1, "children": [{"value": 2, "children": []}]});
        let fitted = Fitter::new()
            .fit_descriptor(schema.root().unwrap(), &input, &Context::default())
            .unwrap();
        assert_eq!(fitted, input);
    }

    #[test]
    fn expect_discriminates_union_alternatives() {
        let schema = schema(json!({
            "root": "Item",
            "types": {
                "Item": {"union": ["Story", "Comment"]},
                "Story": {"record": {"fields": {"type": "string", "title": "string"},
                                     "expect": {"type": "story"}}},
                "Comment": {"record": {"fields": {"type": "string", "title": {"type": "string", "default": ""}},
                                       "expect": {"type": "comment"}}}
            }
        }));
        let fitter = Fitter::new();
        let root = schema.root().unwrap();
        let comment = fitter
            .fit_descriptor(root, &json!({"type": "comment", "title": "hi"}), &Context::default())
            .unwrap();
        assert_eq!(comment, json!({"type": "comment", "title": "hi"}));

        let err = fitter
            .fit_descriptor(root, &json!({"type": "job"}), &Context::default())
            .unwrap_err();
        let issues: Vec<String> = err.issues().iter().map(ToString::to_string).collect();
        assert_eq!(
            issues,
            [
                "at $: no alternative of `Item` matched",
                "at $<Story>.title: missing field `title`",
                "at $<Comment>: `Comment` rejected the value: `type` is \"job\", expected \"comment\"",
            ]
        );
    }

    #[test]
    fn context_fields_and_literals() {
        let schema = schema(json!({
            "types": {
                "Event": {"record": {"fields": {
                    "kind": {"literal": ["click", 3]},
                    "tenant": {"type": "string", "context": "tenant"}
                }}}
            }
        }));
        let event = schema.get("Event").unwrap();
        let fitter = Fitter::new();
        let context = Context::new().with("tenant", "acme");
        assert_eq!(
            fitter.fit_descriptor(event, &json!({"kind": 3}), &context).unwrap(),
            json!({"kind": 3, "tenant": "acme"})
        );
        let err = fitter
            .fit_descriptor(event, &json!({"kind": "click"}), &Context::default())
            .unwrap_err();
        assert_eq!(
            err.issues()[0].issue,
            FitIssue::MissingContextKey {
                key: "tenant".into()
            }
        );
    }

    #[test]
    fn invalid_documents_are_rejected() {
        let unknown = Schema::from_value(json!({"types": {"A": {"list": "B"}}})).unwrap_err();
        assert!(matches!(
            unknown,
            SchemaError::Classify(ClassifyError::UnresolvableType { ref name }) if name == "B"
        ));

        let alias_loop = Schema::from_value(json!({"types": {"A": "B", "B": {"optional": "A"}}}));
        assert!(matches!(
            alias_loop,
            Err(SchemaError::Classify(ClassifyError::UnsupportedType { .. }))
        ));

        let reserved = Schema::from_value(json!({"types": {"int": "string"}}));
        assert!(reserved.is_err());

        let malformed = "{\"types\": {\"A\": {\"record\": {\"fields\": {}, \"extra\": 1}}}}"
            .parse::<Schema>()
            .unwrap_err();
        assert!(matches!(malformed, SchemaError::Parse(_)), "{malformed}");
    }

    #[test]
    fn context_fields_cannot_lead_back_to_their_record() {
        let direct = Schema::from_value(json!({
            "types": {"A": {"record": {"fields": {"c": {"type": "A", "context": "k"}}}}}
        }))
        .unwrap_err();
        assert!(
            matches!(&direct, SchemaError::Classify(ClassifyError::UnsupportedType { name, .. }) if name == "A"),
            "{direct}"
        );

        let inline = Schema::from_value(json!({
            "types": {"A": {"record": {"fields": {
                "c": {"record": {"fields": {"up": {"type": {"list": "A"}, "context": "k"}}}}
            }}}}
        }))
        .unwrap_err();
        assert!(
            matches!(&inline, SchemaError::Classify(ClassifyError::UnsupportedType { .. })),
            "{inline}"
        );

        let harmless = schema(json!({
            "types": {"A": {"record": {"fields": {"c": {"type": {"list": "int"}, "context": "k"}}}}}
        }));
        let fitted = Fitter::new()
            .fit_descriptor(schema_get(&harmless, "A"), &json!({}), &Context::new().with("k", json!([1, 2])))
            .unwrap();
        assert_eq!(fitted, json!({"c": [1, 2]}));
    }

    #[test]
    fn absent_keys_take_the_empty_value_of_any_nullable_type() {
        let schema = schema(json!({
            "types": {
                "MaybeInt": {"optional": "int"},
                "Count": "MaybeInt",
                "R": {"record": {"fields": {
                    "direct": "MaybeInt",
                    "aliased": "Count",
                    "either": {"union": ["int", "none"]},
                    "required": "int"
                }}}
            }
        }));
        let r = schema_get(&schema, "R");
        let fitted = Fitter::new()
            .fit_descriptor(r, &json!({"required": 1}), &Context::default())
            .unwrap();
        assert_eq!(
            fitted,
            json!({"direct": null, "aliased": null, "either": null, "required": 1})
        );

        let err = Fitter::new()
            .fit_descriptor(r, &json!({}), &Context::default())
            .unwrap_err();
        let issues: Vec<String> = err.issues().iter().map(ToString::to_string).collect();
        assert_eq!(issues, ["at $.required: missing field `required`"]);
    }

    fn schema_get<'s>(schema: &'s Schema, name: &str) -> &'s Arc<TypeDescriptor> {
        schema.get(name).unwrap()
    }
}
