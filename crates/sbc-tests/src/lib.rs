//! Shared fixtures for the SBC integration tests and benchmarks.
//!
//! Each fixture type implements [`Reflect`] the way an application would:
//! a wire name, its members in declaration order, and (for polymorphic
//! shapes) the upcast into the base it stands in for.

use std::any::Any;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt::Debug;
use std::io::Read;
use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta};
use rust_decimal::Decimal;
use sbc_types::{Dynamic, Reflect, TypeInfo, TypeRef, reflect_enum};
use tokio::io::{AsyncRead, ReadBuf};
use uuid::Uuid;

// ── Records ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Person {
    pub name: String,
    pub age: i32,
    pub tags: Vec<String>,
}

impl Reflect for Person {
    fn describe() -> TypeInfo {
        TypeInfo::composite::<Self>("demo.Person")
            .member("Name", |p| &p.name, |p, v| p.name = v)
            .member("Age", |p| &p.age, |p, v| p.age = v)
            .member("Tags", |p| &p.tags, |p, v| p.tags = v)
            .build()
    }
}

/// A later revision of [`Person`] with members an older reader lacks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PersonV2 {
    pub name: String,
    pub age: i32,
    pub tags: Vec<String>,
    pub email: Option<String>,
    pub scores: Vec<i32>,
    pub home: Option<Address>,
}

impl Reflect for PersonV2 {
    fn describe() -> TypeInfo {
        TypeInfo::composite::<Self>("demo.PersonV2")
            .member("Name", |p| &p.name, |p, v| p.name = v)
            .member("Age", |p| &p.age, |p, v| p.age = v)
            .member("Tags", |p| &p.tags, |p, v| p.tags = v)
            .member("Email", |p| &p.email, |p, v| p.email = v)
            .member("Scores", |p| &p.scores, |p, v| p.scores = v)
            .member("Home", |p| &p.home, |p, v| p.home = v)
            .build()
    }
}

impl PersonV2 {
    /// The [`Person`] an older reader should see.
    #[must_use]
    pub fn as_v1(&self) -> Person {
        Person {
            name: self.name.clone(),
            age: self.age,
            tags: self.tags.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Address {
    pub street: String,
    pub zip: Option<u32>,
}

impl Reflect for Address {
    fn describe() -> TypeInfo {
        TypeInfo::composite::<Self>("demo.Address")
            .member("Street", |a| &a.street, |a, v| a.street = v)
            .member("Zip", |a| &a.zip, |a, v| a.zip = v)
            .build()
    }
}

/// Members numbered by annotation rather than declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Annotated {
    pub first: u16,
    pub second: String,
    pub skipped: i64,
    pub cache: Option<String>,
}

impl Reflect for Annotated {
    fn describe() -> TypeInfo {
        TypeInfo::composite::<Self>("demo.Annotated")
            .member("First", |a| &a.first, |a, v| a.first = v)
            .index(7)
            .member("Second", |a| &a.second, |a, v| a.second = v)
            .index(2)
            .member("Skipped", |a| &a.skipped, |a, v| a.skipped = v)
            .member("Cache", |a| &a.cache, |a, v| a.cache = v)
            .index(0)
            .ignore()
            .build()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TreeNode {
    pub value: i32,
    pub children: Vec<TreeNode>,
}

impl Reflect for TreeNode {
    fn describe() -> TypeInfo {
        TypeInfo::composite::<Self>("demo.TreeNode")
            .member("Value", |n| &n.value, |n, v| n.value = v)
            .member("Children", |n| &n.children, |n, v| n.children = v)
            .build()
    }
}

impl TreeNode {
    /// A complete tree of the given depth and fan-out.
    #[must_use]
    pub fn complete(depth: u32, fan_out: usize) -> Self {
        let children = if depth == 0 {
            Vec::new()
        } else {
            (0..fan_out).map(|_| Self::complete(depth - 1, fan_out)).collect()
        };
        Self {
            value: i32::try_from(depth).unwrap_or(i32::MAX),
            children,
        }
    }
}

// ── Polymorphism ────────────────────────────────────────────────────────

pub trait Shape: Any + Send + Debug {
    fn area(&self) -> f64;
    fn dynamic(&self) -> Dynamic<'_>;
}

#[allow(clippy::borrowed_box)]
fn shape_runtime(shape: &Box<dyn Shape>) -> Dynamic<'_> {
    shape.dynamic()
}

impl Reflect for Box<dyn Shape> {
    fn describe() -> TypeInfo {
        TypeInfo::polymorphic::<Self>("demo.Shape", shape_runtime)
    }
}

impl PartialEq for Box<dyn Shape> {
    fn eq(&self, other: &Self) -> bool {
        format!("{self:?}") == format!("{other:?}")
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Circle {
    pub radius: f64,
}

impl Shape for Circle {
    fn area(&self) -> f64 {
        std::f64::consts::PI * self.radius * self.radius
    }

    fn dynamic(&self) -> Dynamic<'_> {
        Dynamic::of(self)
    }
}

impl Reflect for Circle {
    fn describe() -> TypeInfo {
        TypeInfo::composite::<Self>("demo.Circle")
            .member("Radius", |c| &c.radius, |c, v| c.radius = v)
            .implements::<Box<dyn Shape>>(|circle| -> Box<dyn Shape> { Box::new(circle) })
            .build()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Rect {
    pub width: f64,
    pub height: f64,
    pub label: Option<String>,
}

impl Shape for Rect {
    fn area(&self) -> f64 {
        self.width * self.height
    }

    fn dynamic(&self) -> Dynamic<'_> {
        Dynamic::of(self)
    }
}

impl Reflect for Rect {
    fn describe() -> TypeInfo {
        TypeInfo::composite::<Self>("demo.Rect")
            .member("Width", |r| &r.width, |r, v| r.width = v)
            .member("Height", |r| &r.height, |r, v| r.height = v)
            .member("Label", |r| &r.label, |r, v| r.label = v)
            .implements::<Box<dyn Shape>>(|rect| -> Box<dyn Shape> { Box::new(rect) })
            .build()
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct Drawing {
    pub title: String,
    pub shapes: Vec<Box<dyn Shape>>,
    pub focus: Option<Box<dyn Shape>>,
}

impl Reflect for Drawing {
    fn describe() -> TypeInfo {
        TypeInfo::composite::<Self>("demo.Drawing")
            .member("Title", |d| &d.title, |d, v| d.title = v)
            .member("Shapes", |d| &d.shapes, |d, v| d.shapes = v)
            .member("Focus", |d| &d.focus, |d, v| d.focus = v)
            .build()
    }
}

impl Drawing {
    #[must_use]
    pub fn sample() -> Self {
        Self {
            title: String::from("sketch"),
            shapes: vec![
                Box::new(Circle { radius: 1.5 }) as Box<dyn Shape>,
                Box::new(Rect {
                    width: 2.0,
                    height: 3.0,
                    label: Some(String::from("door")),
                }),
            ],
            focus: Some(Box::new(Circle { radius: 0.25 }) as Box<dyn Shape>),
        }
    }
}

// ── Every category at once ──────────────────────────────────────────────

reflect_enum! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub enum Color: u8 as "demo.Color" {
        #[default]
        Red = 1,
        Green = 2,
        Blue = 3,
    }
}

reflect_enum! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub enum Level: i16 as "demo.Level" {
        #[default]
        Low = -1,
        High = 1000,
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct KitchenSink {
    pub flag: bool,
    pub byte: u8,
    pub signed_byte: i8,
    pub short: i16,
    pub ushort: u16,
    pub int: i32,
    pub uint: u32,
    pub long: i64,
    pub ulong: u64,
    pub single: f32,
    pub double: f64,
    pub money: Decimal,
    pub letter: char,
    pub stamp: NaiveDateTime,
    pub zoned: Option<DateTime<FixedOffset>>,
    pub elapsed: TimeDelta,
    pub id: Uuid,
    pub text: String,
    pub maybe_int: Option<i32>,
    pub maybe_text: Option<String>,
    pub color: Color,
    pub level: Option<Level>,
    pub kind: TypeRef,
    pub lookup: HashMap<String, Vec<u8>>,
    pub ordered: BTreeSet<i64>,
    pub queue: VecDeque<Option<bool>>,
    pub nested: Option<Address>,
}

impl Reflect for KitchenSink {
    fn describe() -> TypeInfo {
        TypeInfo::composite::<Self>("demo.KitchenSink")
            .member("Flag", |k| &k.flag, |k, v| k.flag = v)
            .member("Byte", |k| &k.byte, |k, v| k.byte = v)
            .member("SignedByte", |k| &k.signed_byte, |k, v| k.signed_byte = v)
            .member("Short", |k| &k.short, |k, v| k.short = v)
            .member("UShort", |k| &k.ushort, |k, v| k.ushort = v)
            .member("Int", |k| &k.int, |k, v| k.int = v)
            .member("UInt", |k| &k.uint, |k, v| k.uint = v)
            .member("Long", |k| &k.long, |k, v| k.long = v)
            .member("ULong", |k| &k.ulong, |k, v| k.ulong = v)
            .member("Single", |k| &k.single, |k, v| k.single = v)
            .member("Double", |k| &k.double, |k, v| k.double = v)
            .member("Money", |k| &k.money, |k, v| k.money = v)
            .member("Letter", |k| &k.letter, |k, v| k.letter = v)
            .member("Stamp", |k| &k.stamp, |k, v| k.stamp = v)
            .member("Zoned", |k| &k.zoned, |k, v| k.zoned = v)
            .member("Elapsed", |k| &k.elapsed, |k, v| k.elapsed = v)
            .member("Id", |k| &k.id, |k, v| k.id = v)
            .member("Text", |k| &k.text, |k, v| k.text = v)
            .member("MaybeInt", |k| &k.maybe_int, |k, v| k.maybe_int = v)
            .member("MaybeText", |k| &k.maybe_text, |k, v| k.maybe_text = v)
            .member("Color", |k| &k.color, |k, v| k.color = v)
            .member("Level", |k| &k.level, |k, v| k.level = v)
            .member("Kind", |k| &k.kind, |k, v| k.kind = v)
            .member("Lookup", |k| &k.lookup, |k, v| k.lookup = v)
            .member("Ordered", |k| &k.ordered, |k, v| k.ordered = v)
            .member("Queue", |k| &k.queue, |k, v| k.queue = v)
            .member("Nested", |k| &k.nested, |k, v| k.nested = v)
            .build()
    }
}

impl KitchenSink {
    /// A value with every member populated.
    #[must_use]
    pub fn sample() -> Self {
        let stamp = NaiveDate::from_ymd_opt(2024, 2, 29)
            .and_then(|date| date.and_hms_nano_opt(13, 37, 5, 123_456_789))
            .expect("valid timestamp");
        let offset = FixedOffset::east_opt(5 * 3600 + 30 * 60).expect("offset within a day");
        Self {
            flag: true,
            byte: 0xAB,
            signed_byte: -7,
            short: -12_345,
            ushort: 54_321,
            int: -1_000_000,
            uint: 4_000_000_000,
            long: i64::MIN + 1,
            ulong: u64::MAX - 1,
            single: 1.5,
            double: -2.25e-10,
            money: Decimal::new(-123_456_789, 4),
            letter: 'é',
            stamp,
            zoned: Some(DateTime::from_naive_utc_and_offset(stamp, offset)),
            elapsed: TimeDelta::milliseconds(-90_061_001),
            id: Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef),
            text: String::from("kitchen ✓"),
            maybe_int: Some(42),
            maybe_text: None,
            color: Color::Blue,
            level: Some(Level::High),
            kind: TypeRef::of::<Person>(),
            lookup: HashMap::from([
                (String::from("empty"), Vec::new()),
                (String::from("bytes"), vec![1, 2, 3]),
            ]),
            ordered: BTreeSet::from([-5, 0, 99]),
            queue: VecDeque::from([Some(true), None, Some(false)]),
            nested: Some(Address {
                street: String::from("1 Main St"),
                zip: None,
            }),
        }
    }
}

// ── Wide composites for index boundaries ────────────────────────────────

/// A composite with `N` one-byte members named `F0..F{N-1}`.
#[derive(Clone, Debug, PartialEq)]
pub struct Wide<const N: usize> {
    pub fields: [u8; N],
}

impl<const N: usize> Wide<N> {
    #[must_use]
    pub fn zeroed() -> Self {
        Self { fields: [0; N] }
    }

    /// Each field holds its own position, truncated to a byte.
    #[must_use]
    pub fn numbered() -> Self {
        let mut wide = Self::zeroed();
        for (i, field) in wide.fields.iter_mut().enumerate() {
            *field = u8::try_from(i % 256).unwrap_or(u8::MAX);
        }
        wide
    }
}

impl<const N: usize> Reflect for Wide<N> {
    fn describe() -> TypeInfo {
        (0..N)
            .fold(
                TypeInfo::composite_with::<Self>(format!("demo.Wide{N}"), Self::zeroed),
                |builder, i| {
                    builder.member(
                        format!("F{i}"),
                        move |w| &w.fields[i],
                        move |w, v| w.fields[i] = v,
                    )
                },
            )
            .build()
    }
}

// ── Readers that hand out input in small pieces ─────────────────────────

/// Blocking reader returning at most `chunk` bytes per read.
pub struct ChunkedReader<'a> {
    data: &'a [u8],
    chunk: usize,
}

impl<'a> ChunkedReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8], chunk: usize) -> Self {
        Self {
            data,
            chunk: chunk.max(1),
        }
    }
}

impl Read for ChunkedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.chunk.min(buf.len()).min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

/// Async reader returning at most `chunk` bytes per poll.
pub struct AsyncChunkedReader<'a> {
    data: &'a [u8],
    chunk: usize,
}

impl<'a> AsyncChunkedReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8], chunk: usize) -> Self {
        Self {
            data,
            chunk: chunk.max(1),
        }
    }
}

impl AsyncRead for AsyncChunkedReader<'_> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let data = self.data;
        let n = self.chunk.min(buf.remaining()).min(data.len());
        buf.put_slice(&data[..n]);
        self.data = &data[n..];
        Poll::Ready(Ok(()))
    }
}
