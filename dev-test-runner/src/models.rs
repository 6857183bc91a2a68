//! Hacker News item models.
//!
//! Every item carries a `type` tag; each record rejects the tags of the
//! others, which is what lets [`Item`] pick the right alternative.
use json_fit::{ClassifyError, Describer, Fit, FieldValues, HookError, Rejection, Timestamp, TypeDescriptor};

#[derive(Debug)]
pub enum Item {
    Story(Story),
    Comment(Comment),
    Job(Job),
    Poll(Poll),
}

#[derive(Debug)]
pub struct Story {
    pub kind: ItemType,
    pub id: i64,
    pub by: String,
    pub time: Timestamp,
    pub title: String,
    pub url: Option<String>,
    pub score: u32,
    pub descendants: u32,
    pub kids: Vec<i64>,
    pub source: String,
}

#[derive(Debug)]
pub struct Comment {
    pub kind: ItemType,
    pub id: i64,
    pub by: String,
    pub time: Timestamp,
    pub parent: i64,
    pub text: String,
    pub kids: Vec<i64>,
    pub source: String,
}

#[derive(Debug)]
pub struct Job {
    pub kind: ItemType,
    pub id: i64,
    pub by: String,
    pub time: Timestamp,
    pub title: String,
    pub url: Option<String>,
    pub source: String,
}

#[derive(Debug)]
pub struct Poll {
    pub kind: ItemType,
    pub id: i64,
    pub by: String,
    pub time: Timestamp,
    pub title: String,
    pub parts: Vec<i64>,
    pub score: u32,
    pub source: String,
}

impl Item {
    pub fn id(&self) -> i64 {
        match self {
            Item::Story(x) => x.id,
            Item::Comment(x) => x.id,
            Item::Job(x) => x.id,
            Item::Poll(x) => x.id,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Item::Story(_) => "story",
            Item::Comment(_) => "comment",
            Item::Job(_) => "job",
            Item::Poll(_) => "poll",
        }
    }
}

/// The `type` tag of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Story,
    Comment,
    Job,
    Poll,
}

impl Fit for ItemType {
    fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
        cx.enumeration::<ItemType>("ItemType")
            .member(ItemType::Story, "Story", "story")
            .member(ItemType::Comment, "Comment", "comment")
            .member(ItemType::Job, "Job", "job")
            .member(ItemType::Poll, "Poll", "poll")
            .build()
    }
}

fn expect_tag(values: &mut FieldValues, tag: ItemType) -> Result<ItemType, HookError> {
    let found: ItemType = values.take("kind")?;
    if found == tag {
        Ok(found)
    } else {
        Err(Rejection::new(format!("tagged {found:?}, not {tag:?}")).into())
    }
}

impl Fit for Item {
    fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
        cx.union::<Item>("Item")
            .alternative(Item::Story, |x: &Item| match x {
                Item::Story(s) => Some(s),
                _ => None,
            })
            .alternative(Item::Comment, |x: &Item| match x {
                Item::Comment(c) => Some(c),
                _ => None,
            })
            .alternative(Item::Job, |x: &Item| match x {
                Item::Job(j) => Some(j),
                _ => None,
            })
            .alternative(Item::Poll, |x: &Item| match x {
                Item::Poll(p) => Some(p),
                _ => None,
            })
            .build()
    }
}

impl Fit for Story {
    fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
        cx.record::<Story>("Story")
            .field_from("kind", "type", |x: &Story| &x.kind)
            .field("id", |x: &Story| &x.id)
            .field("by", |x: &Story| &x.by)
            .field("time", |x: &Story| &x.time)
            .field("title", |x: &Story| &x.title)
            .field("url", |x: &Story| &x.url)
            .field("score", |x: &Story| &x.score)
            .field_or("descendants", |x: &Story| &x.descendants, || 0)
            .field_or("kids", |x: &Story| &x.kids, Vec::new)
            .context::<String>("source", "source")
            .build(|v| {
                let kind = expect_tag(v, ItemType::Story)?;
                Ok(Story {
                    kind,
                    id: v.take("id")?,
                    by: v.take("by")?,
                    time: v.take("time")?,
                    title: v.take("title")?,
                    url: v.take("url")?,
                    score: v.take("score")?,
                    descendants: v.take("descendants")?,
                    kids: v.take("kids")?,
                    source: v.take("source")?,
                })
            })
    }
}

impl Fit for Comment {
    fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
        cx.record::<Comment>("Comment")
            .field_from("kind", "type", |x: &Comment| &x.kind)
            .field("id", |x: &Comment| &x.id)
            .field("by", |x: &Comment| &x.by)
            .field("time", |x: &Comment| &x.time)
            .field("parent", |x: &Comment| &x.parent)
            .field("text", |x: &Comment| &x.text)
            .field_or("kids", |x: &Comment| &x.kids, Vec::new)
            .context::<String>("source", "source")
            .build(|v| {
                let kind = expect_tag(v, ItemType::Comment)?;
                Ok(Comment {
                    kind,
                    id: v.take("id")?,
                    by: v.take("by")?,
                    time: v.take("time")?,
                    parent: v.take("parent")?,
                    text: v.take("text")?,
                    kids: v.take("kids")?,
                    source: v.take("source")?,
                })
            })
    }
}

impl Fit for Job {
    fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
        cx.record::<Job>("Job")
            .field_from("kind", "type", |x: &Job| &x.kind)
            .field("id", |x: &Job| &x.id)
            .field("by", |x: &Job| &x.by)
            .field("time", |x: &Job| &x.time)
            .field("title", |x: &Job| &x.title)
            .field("url", |x: &Job| &x.url)
            .context::<String>("source", "source")
            .build(|v| {
                let kind = expect_tag(v, ItemType::Job)?;
                Ok(Job {
                    kind,
                    id: v.take("id")?,
                    by: v.take("by")?,
                    time: v.take("time")?,
                    title: v.take("title")?,
                    url: v.take("url")?,
                    source: v.take("source")?,
                })
            })
    }
}

impl Fit for Poll {
    fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
        cx.record::<Poll>("Poll")
            .field_from("kind", "type", |x: &Poll| &x.kind)
            .field("id", |x: &Poll| &x.id)
            .field("by", |x: &Poll| &x.by)
            .field("time", |x: &Poll| &x.time)
            .field("title", |x: &Poll| &x.title)
            .field("parts", |x: &Poll| &x.parts)
            .field("score", |x: &Poll| &x.score)
            .context::<String>("source", "source")
            .build(|v| {
                let kind = expect_tag(v, ItemType::Poll)?;
                Ok(Poll {
                    kind,
                    id: v.take("id")?,
                    by: v.take("by")?,
                    time: v.take("time")?,
                    title: v.take("title")?,
                    parts: v.take("parts")?,
                    score: v.take("score")?,
                    source: v.take("source")?,
                })
            })
    }
}
