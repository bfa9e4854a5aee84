//! Element model: the typed records that make up a diagram scene.
//!
//! DESIGN
//! ======
//! The canonical element collection is an ordered list of JSON records keyed
//! by a `type` tag. On the Rust side each record is an [`Element`]: a shared
//! base (id, geometry, style, bookkeeping, bound-element list) plus an
//! [`ElementKind`] carrying the type-specific fields. Fields this model does
//! not know about survive in `extra`, so serialize → deserialize never drops
//! attributes.
//!
//! Serde goes through a flat `ElementRecord` so the JSON stays flat while the
//! Rust type stays a sum type. Type-specific fields that show up on the wrong
//! kind (a `text` field on a rectangle) are spilled into `extra`.
//!
//! Typed fields are `Option`s, where `None` means absent. An explicit `null`
//! on input is kept as a `null` entry in `extra` so it is written back out.
//! Once the typed field gets a value, that entry is shadowed and dropped.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[cfg(test)]
#[path = "element_test.rs"]
mod tests;

/// Element types the ingestion pipeline accepts from generated text.
pub const RECOGNIZED_TYPES: [&str; 6] = ["rectangle", "ellipse", "diamond", "text", "arrow", "line"];

// =============================================================================
// KIND
// =============================================================================

/// Type tag plus type-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    Rectangle,
    Ellipse,
    Diamond,
    Text(TextProps),
    Arrow(LinearProps),
    Line(LinearProps),
    /// Any other type (`frame`, `image`, `freedraw`, ...), kept verbatim.
    Other(String),
}

impl ElementKind {
    /// Build a kind from its wire tag with empty type-specific props.
    #[must_use]
    pub fn from_type_name(type_name: &str) -> Self {
        Self::from_parts(type_name, TextProps::default(), LinearProps::default(), &mut Map::new())
    }

    fn from_parts(type_name: &str, text: TextProps, linear: LinearProps, extra: &mut Map<String, Value>) -> Self {
        match type_name {
            "text" => {
                spill(&linear, extra);
                Self::Text(text)
            }
            "arrow" | "line" => {
                spill(&text, extra);
                if type_name == "arrow" { Self::Arrow(linear) } else { Self::Line(linear) }
            }
            other => {
                spill(&text, extra);
                spill(&linear, extra);
                match other {
                    "rectangle" => Self::Rectangle,
                    "ellipse" => Self::Ellipse,
                    "diamond" => Self::Diamond,
                    _ => Self::Other(other.to_owned()),
                }
            }
        }
    }

    /// The wire `type` tag.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Rectangle => "rectangle",
            Self::Ellipse => "ellipse",
            Self::Diamond => "diamond",
            Self::Text(_) => "text",
            Self::Arrow(_) => "arrow",
            Self::Line(_) => "line",
            Self::Other(name) => name,
        }
    }

    /// Closed shapes that can host text and anchor connectors.
    #[must_use]
    pub fn is_shape(&self) -> bool {
        matches!(self, Self::Rectangle | Self::Ellipse | Self::Diamond)
    }

    #[must_use]
    pub fn is_connector(&self) -> bool {
        matches!(self, Self::Arrow(_) | Self::Line(_))
    }

    #[must_use]
    pub fn text(&self) -> Option<&TextProps> {
        match self {
            Self::Text(props) => Some(props),
            _ => None,
        }
    }

    pub fn text_mut(&mut self) -> Option<&mut TextProps> {
        match self {
            Self::Text(props) => Some(props),
            _ => None,
        }
    }

    #[must_use]
    pub fn linear(&self) -> Option<&LinearProps> {
        match self {
            Self::Arrow(props) | Self::Line(props) => Some(props),
            _ => None,
        }
    }

    pub fn linear_mut(&mut self) -> Option<&mut LinearProps> {
        match self {
            Self::Arrow(props) | Self::Line(props) => Some(props),
            _ => None,
        }
    }
}

/// Move non-empty props into the extra map so they survive re-serialization.
fn spill<T>(props: &T, extra: &mut Map<String, Value>)
where
    T: Serialize + Default + PartialEq,
{
    if *props == T::default() {
        return;
    }
    if let Ok(Value::Object(fields)) = serde_json::to_value(props) {
        extra.extend(fields);
    }
}

// =============================================================================
// SHARED FIELD GROUPS
// =============================================================================

/// Visual style. Every field is optional: absence is distinct from any value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Style {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roughness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roundness: Option<Roundness>,
}

/// Corner rounding descriptor, e.g. `{"type": 3}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roundness {
    #[serde(rename = "type")]
    pub kind: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// Editor bookkeeping fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_nonce: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_deleted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<String>,
    /// Fractional ordering key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
}

/// Entry in a shape's `boundElements` list.
///
/// Generated text sometimes lists bare ids; the normalizer upgrades those to
/// `{id, type}` pairs once the referenced element's type is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoundElement {
    Linked {
        id: String,
        #[serde(rename = "type")]
        kind: String,
    },
    Bare(String),
}

impl BoundElement {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Linked { id, .. } | Self::Bare(id) => id,
        }
    }
}

// =============================================================================
// TYPE-SPECIFIC PROPS
// =============================================================================

/// Fields carried by `text` elements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_align: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertical_align: Option<String>,
    /// Shape (or arrow) visually hosting this text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_resize: Option<bool>,
}

/// Fields carried by connectors (`arrow`, `line`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearProps {
    /// Polyline points relative to the element's `(x, y)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<[f64; 2]>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_binding: Option<Binding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_binding: Option<Binding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_arrowhead: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_arrowhead: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elbowed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_committed_point: Option<[f64; 2]>,
}

/// Connector endpoint attachment to a shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub element_id: String,
    #[serde(default)]
    pub focus: f64,
    #[serde(default)]
    pub gap: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_point: Option<[f64; 2]>,
}

impl Binding {
    #[must_use]
    pub fn to(element_id: impl Into<String>) -> Self {
        Self { element_id: element_id.into(), focus: 0.0, gap: 0.0, fixed_point: None }
    }
}

// =============================================================================
// ELEMENT
// =============================================================================

/// One visual object in the diagram.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "ElementRecord")]
pub struct Element {
    /// Globally unique, immutable once assigned.
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub style: Style,
    pub meta: Meta,
    /// Text and connectors attached to this element. Order-insensitive, duplicate-free.
    pub bound_elements: Option<Vec<BoundElement>>,
    pub kind: ElementKind,
    /// Attributes this model does not name, plus explicit nulls, preserved verbatim.
    pub extra: Map<String, Value>,
}

impl<'de> Deserialize<'de> for Element {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Map::<String, Value>::deserialize(deserializer)?;
        let nulls: Vec<String> = fields.iter().filter(|(_, v)| v.is_null()).map(|(k, _)| k.clone()).collect();
        let record = ElementRecord::deserialize(Value::Object(fields))
            .map_err(<D::Error as serde::de::Error>::custom)?;

        let mut element = Self::from(record);
        for key in nulls {
            element.extra.entry(key).or_insert(Value::Null);
        }
        Ok(element)
    }
}

/// Flat wire shape of an element.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ElementRecord {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    #[serde(default)]
    width: f64,
    #[serde(default)]
    height: f64,
    #[serde(flatten)]
    style: Style,
    #[serde(flatten)]
    meta: Meta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bound_elements: Option<Vec<BoundElement>>,
    #[serde(flatten)]
    text: TextProps,
    #[serde(flatten)]
    linear: LinearProps,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<ElementRecord> for Element {
    fn from(record: ElementRecord) -> Self {
        let ElementRecord { id, kind, x, y, width, height, style, meta, bound_elements, text, linear, mut extra } =
            record;
        let kind = ElementKind::from_parts(&kind, text, linear, &mut extra);
        Self { id, x, y, width, height, style, meta, bound_elements, kind, extra }
    }
}

impl From<Element> for ElementRecord {
    fn from(mut element: Element) -> Self {
        element.prune_shadowed_nulls();
        let type_name = element.kind.type_name().to_owned();
        let (text, linear) = match element.kind {
            ElementKind::Text(text) => (text, LinearProps::default()),
            ElementKind::Arrow(linear) | ElementKind::Line(linear) => (TextProps::default(), linear),
            _ => (TextProps::default(), LinearProps::default()),
        };
        Self {
            id: element.id,
            kind: type_name,
            x: element.x,
            y: element.y,
            width: element.width,
            height: element.height,
            style: element.style,
            meta: element.meta,
            bound_elements: element.bound_elements,
            text,
            linear,
            extra: element.extra,
        }
    }
}

impl Element {
    /// Create an element with the given geometry and no optional attributes.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: ElementKind, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            width,
            height,
            style: Style::default(),
            meta: Meta::default(),
            bound_elements: None,
            kind,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        self.kind.type_name()
    }

    #[must_use]
    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.x, self.y, self.width, self.height)
    }

    /// Container id for text elements, `None` for everything else.
    #[must_use]
    pub fn container_id(&self) -> Option<&str> {
        self.kind.text().and_then(|t| t.container_id.as_deref())
    }

    /// Absolute start and end points of a connector.
    ///
    /// Falls back to the `(0,0) → (width,height)` diagonal when fewer than two
    /// points are present.
    #[must_use]
    pub fn endpoints(&self) -> Option<((f64, f64), (f64, f64))> {
        let linear = self.kind.linear()?;
        let (first, last) = match linear.points.as_deref() {
            Some([first, .., last]) => (*first, *last),
            _ => ([0.0, 0.0], [self.width, self.height]),
        };
        Some(((self.x + first[0], self.y + first[1]), (self.x + last[0], self.y + last[1])))
    }

    /// Absolute position of a connector's middle point.
    ///
    /// The middle vertex for an odd point count, otherwise the middle of the
    /// central segment.
    #[must_use]
    pub fn midpoint(&self) -> Option<(f64, f64)> {
        let linear = self.kind.linear()?;
        match linear.points.as_deref() {
            Some(points) if points.len() % 2 == 1 => {
                let mid = points[points.len() / 2];
                Some((self.x + mid[0], self.y + mid[1]))
            }
            Some(points) if !points.is_empty() => {
                let (a, b) = (points[points.len() / 2 - 1], points[points.len() / 2]);
                Some((self.x + (a[0] + b[0]) / 2.0, self.y + (a[1] + b[1]) / 2.0))
            }
            _ => Some((self.x + self.width / 2.0, self.y + self.height / 2.0)),
        }
    }

    /// Drop `null` entries in `extra` whose typed field now holds a value.
    pub fn prune_shadowed_nulls(&mut self) {
        if !self.extra.values().any(Value::is_null) {
            return;
        }
        let typed = self.typed_keys();
        self.extra.retain(|key, value| !(value.is_null() && typed.contains(key)));
    }

    /// Wire names of the typed fields currently set.
    fn typed_keys(&self) -> HashSet<String> {
        let mut keys = HashSet::new();
        collect_keys(&self.style, &mut keys);
        collect_keys(&self.meta, &mut keys);
        if let Some(text) = self.kind.text() {
            collect_keys(text, &mut keys);
        }
        if let Some(linear) = self.kind.linear() {
            collect_keys(linear, &mut keys);
        }
        if self.bound_elements.is_some() {
            keys.insert("boundElements".to_owned());
        }
        keys
    }

    /// Whether `id` already appears in this element's bound list.
    #[must_use]
    pub fn has_bound(&self, id: &str) -> bool {
        self.bound_elements
            .as_ref()
            .is_some_and(|list| list.iter().any(|b| b.id() == id))
    }

    /// Add a `{id, type}` pair to the bound list unless the id is already there.
    pub fn add_bound(&mut self, id: &str, kind: &str) {
        if self.has_bound(id) {
            return;
        }
        self.bound_elements
            .get_or_insert_with(Vec::new)
            .push(BoundElement::Linked { id: id.to_owned(), kind: kind.to_owned() });
    }
}

fn collect_keys<T: Serialize>(part: &T, keys: &mut HashSet<String>) {
    if let Ok(Value::Object(fields)) = serde_json::to_value(part) {
        keys.extend(fields.into_iter().map(|(key, _)| key));
    }
}

// =============================================================================
// GEOMETRY
// =============================================================================

/// Axis-aligned bounding box with non-negative extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    /// Normalizes negative extents so `(x, y)` is always the top-left corner.
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        let (x, width) = if width < 0.0 { (x + width, -width) } else { (x, width) };
        let (y, height) = if height < 0.0 { (y + height, -height) } else { (y, height) };
        Self { x, y, width, height }
    }

    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Euclidean distance from a point to the box; zero when inside.
    #[must_use]
    pub fn distance_to(&self, px: f64, py: f64) -> f64 {
        let dx = (self.x - px).max(0.0).max(px - (self.x + self.width));
        let dy = (self.y - py).max(0.0).max(py - (self.y + self.height));
        dx.hypot(dy)
    }

    /// Distance from a point to the box center.
    #[must_use]
    pub fn center_distance(&self, px: f64, py: f64) -> f64 {
        let (cx, cy) = self.center();
        (cx - px).hypot(cy - py)
    }
}

/// Average glyph width as a fraction of the font size.
const GLYPH_WIDTH_RATIO: f64 = 0.6;

/// Rough `(width, height)` of a text block: longest line × glyph width, line count × line height.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn estimate_text_size(text: &str, font_size: f64, line_height: f64) -> (f64, f64) {
    let lines: Vec<&str> = text.split('\n').collect();
    let longest = lines.iter().map(|line| line.chars().count()).max().unwrap_or(0);
    let width = longest as f64 * font_size * GLYPH_WIDTH_RATIO;
    let height = lines.len() as f64 * font_size * line_height;
    (width, height)
}

// =============================================================================
// REFERENCE CHECKS
// =============================================================================

/// A reference field naming an id that is not in the collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    pub element_id: String,
    pub field: &'static str,
    pub target: String,
}

/// Report every reference field that names an id absent from `elements`.
#[must_use]
pub fn dangling_references(elements: &[Element]) -> Vec<DanglingReference> {
    let ids: HashSet<&str> = elements.iter().map(|e| e.id.as_str()).collect();
    let mut dangling = Vec::new();
    let mut check = |element: &Element, field: &'static str, target: &str| {
        if !ids.contains(target) {
            dangling.push(DanglingReference {
                element_id: element.id.clone(),
                field,
                target: target.to_owned(),
            });
        }
    };

    for element in elements {
        if let Some(container) = element.container_id() {
            check(element, "containerId", container);
        }
        if let Some(linear) = element.kind.linear() {
            if let Some(binding) = &linear.start_binding {
                check(element, "startBinding", &binding.element_id);
            }
            if let Some(binding) = &linear.end_binding {
                check(element, "endBinding", &binding.element_id);
            }
        }
        for bound in element.bound_elements.iter().flatten() {
            check(element, "boundElements", bound.id());
        }
    }
    dangling
}
