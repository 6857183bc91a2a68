use json_fit::{Config, Context, FitIssue, Fitter, Schema, SchemaError};
use serde_json::{json, Value};

const HACKER_NEWS: &str = r#"{
    "root": "Item",
    "types": {
        "Item": {"union": ["Story", "Comment"]},
        "Story": {"record": {
            "fields": {
                "type": "string",
                "id": "int",
                "by": "string",
                "time": {"narrow": "timestamp"},
                "title": "string",
                "score": {"type": "int", "default": 0},
                "kids": {"type": {"list": "int"}, "default": []},
                "site": {"type": "string", "context": "site"}
            },
            "expect": {"type": "story"}
        }},
        "Comment": {"record": {
            "fields": {
                "type": "string",
                "id": "int",
                "by": "string",
                "time": {"narrow": "timestamp"},
                "parent": "int",
                "text": {"type": "string", "from": "html"},
                "replies": {"type": {"optional": {"list": "Comment"}}}
            },
            "expect": {"type": "comment"}
        }}
    }
}"#;

fn schema() -> Schema {
    HACKER_NEWS.parse().unwrap()
}

fn site() -> Context {
    Context::new().with("site", "news.ycombinator.com")
}

#[test]
fn stories_are_normalized() {
    let schema = schema();
    let input = json!({
        "type": "story",
        "id": 8863,
        "by": "dhouston",
        "time": 1175714200,
        "title": "My YC app: Dropbox",
        "url": "http://www.getdropbox.com/u/2/screencast.html"
    });
    let fitted = Fitter::new()
        .fit_descriptor(schema.root().unwrap(), &input, &site())
        .unwrap();
    assert_eq!(
        fitted,
        json!({
            "type": "story",
            "id": 8863,
            "by": "dhouston",
            "time": "2007-04-04T19:16:40+00:00",
            "title": "My YC app: Dropbox",
            "score": 0,
            "kids": [],
            "site": "news.ycombinator.com"
        })
    );
}

#[test]
fn recursive_comments_use_their_source_keys() {
    let schema = schema();
    let input = json!({
        "type": "comment",
        "id": 2,
        "by": "norvig",
        "time": 1314211127,
        "parent": 1,
        "html": "Aw shucks",
        "replies": [
            {"type": "comment", "id": 3, "by": "pg", "time": 1314211200, "parent": 2, "html": "ok"}
        ]
    });
    let fitted = Fitter::new()
        .fit_descriptor(schema.root().unwrap(), &input, &Context::default())
        .unwrap();
    assert_eq!(fitted["text"], json!("Aw shucks"));
    assert_eq!(fitted["replies"][0]["text"], json!("ok"));
    assert_eq!(fitted["replies"][0]["replies"], Value::Null);
}

#[test]
fn mismatches_are_located_inside_alternatives() {
    let schema = schema();
    let input = json!({
        "type": "comment",
        "id": 2,
        "by": "norvig",
        "time": "yesterday",
        "parent": 1,
        "html": "Aw shucks"
    });
    let err = Fitter::new()
        .fit_descriptor(schema.root().unwrap(), &input, &site())
        .unwrap_err();
    let issues: Vec<String> = err.issues().iter().map(ToString::to_string).collect();
    assert_eq!(
        issues,
        [
            "at $: no alternative of `Item` matched",
            "at $<Story>.time: expected int, got string",
            "at $<Story>.title: missing field `title`",
            "at $<Comment>.time: expected int, got string",
        ]
    );
}

#[test]
fn strict_mode_flags_unread_keys() {
    let schema = schema();
    let input = json!({
        "type": "comment",
        "id": 2,
        "by": "norvig",
        "time": 1314211127,
        "parent": 1,
        "html": "hi",
        "dead": true
    });
    let comment = schema.get("Comment").unwrap();
    let strict = Fitter::new().with_config(Config {
        no_unwanted_keys: true,
    });
    let err = strict
        .fit_descriptor(comment, &input, &Context::default())
        .unwrap_err();
    assert_eq!(err.issues().len(), 1);
    assert_eq!(err.issues()[0].path.to_string(), "$.dead");
    assert_eq!(
        err.issues()[0].issue,
        FitIssue::UnwantedKey {
            owner: "Comment".into()
        }
    );
}

#[test]
fn signatures_describe_declared_types() {
    let schema = schema();
    let names: Vec<&str> = schema.types().map(|(name, _)| name).collect();
    assert_eq!(names, ["Item", "Story", "Comment"]);
    assert_eq!(
        schema.get("Item").unwrap().to_string(),
        "union Item = Story | Comment"
    );
    assert_eq!(
        schema.resolve(Some("Comment")).unwrap().to_string(),
        "record Comment { type: string, id: int, by: string, time: timestamp, parent: int, \
         text: string from \"html\", replies: optional<list<Comment>> }"
    );
    assert!(schema.resolve(Some("Job")).is_err());
}

#[test]
fn primitive_roots_and_invalid_defaults() {
    let schema = Schema::from_value(json!({"root": "float", "types": {}})).unwrap();
    let fitted = Fitter::new()
        .fit_descriptor(schema.root().unwrap(), &json!(2), &Context::default())
        .unwrap();
    assert_eq!(fitted, json!(2.0));

    let schema = Schema::from_value(json!({
        "types": {"Page": {"record": {"fields": {"size": {"type": "int", "default": "ten"}}}}}
    }))
    .unwrap();
    let err = Fitter::new()
        .fit_descriptor(schema.get("Page").unwrap(), &json!({}), &Context::default())
        .unwrap_err();
    assert!(matches!(
        &err.issues()[0].issue,
        FitIssue::InvalidDefault { field, .. } if field == "size"
    ));
}

#[test]
fn load_errors_carry_the_document_path() {
    let err = r#"{"types": {"A": {"record": {"fields": {"x": "int"}}}}, "rooot": "A"}"#
        .parse::<Schema>()
        .unwrap_err();
    let SchemaError::Parse(located) = &err else {
        panic!("expected a parse error, got {err}");
    };
    assert!(located.message.contains("rooot"), "{located}");

    let err = r#"{"types": {"A": {"record": {"fields": {"x": "int"}, "expect": {"y": 1}}}}}"#
        .parse::<Schema>()
        .unwrap_err();
    assert!(matches!(err, SchemaError::Classify(_)), "{err}");
}
