//! Style and reference normalization for a freshly ingested or decompressed batch.
//!
//! DESIGN
//! ======
//! Generated elements arrive with gaps: shapes without colors, text without a
//! stroke, arrows that visually touch two boxes but carry no bindings, bound
//! lists naming bare ids. The normalizer fills those gaps in a fixed order so
//! later rules can rely on earlier ones:
//!
//! 0. labels on shapes and arrows become bound text elements
//! 1. shapes missing stroke or fill take the next palette swatch
//! 2. text missing stroke inherits its container's stroke, else the theme's
//! 3. arrows bind unbound endpoints to the nearest shape within the radius
//! 4. bare bound-element ids become `{id, type}` pairs
//! 5. contained text is registered on its host and recentered
//!
//! Every rule only fills what is missing, so running the normalizer twice is
//! the same as running it once.
//!
//! A stream delivers a diagram over many batches. [`NormalizeContext`] keeps
//! what earlier batches emitted plus the palette cursor, so a shape in batch
//! two takes the next swatch and an arrow can bind to a shape from batch one.
//! Earlier elements that gain a back-link are reported as updates.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::element::{Binding, BoundElement, Bounds, Element, ElementKind, Roundness, TextProps, estimate_text_size};

/// Stroke/fill pair assigned to a shape with missing colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swatch {
    pub stroke: &'static str,
    pub fill: &'static str,
}

/// Cyclic palette for shapes, in assignment order.
pub const PALETTE: [Swatch; 10] = [
    Swatch { stroke: "#f97316", fill: "#fed7aa" },
    Swatch { stroke: "#8b5cf6", fill: "#ddd6fe" },
    Swatch { stroke: "#60a5fa", fill: "#bfdbfe" },
    Swatch { stroke: "#ef4444", fill: "#fecaca" },
    Swatch { stroke: "#22c55e", fill: "#bbf7d0" },
    Swatch { stroke: "#f59e0b", fill: "#fde68a" },
    Swatch { stroke: "#14b8a6", fill: "#99f6e4" },
    Swatch { stroke: "#ec4899", fill: "#fbcfe8" },
    Swatch { stroke: "#6366f1", fill: "#c7d2fe" },
    Swatch { stroke: "#64748b", fill: "#e2e8f0" },
];

pub const LIGHT_STROKE: &str = "#1e1e1e";
pub const DARK_STROKE: &str = "#ffffff";

/// Maximum endpoint-to-shape distance for auto-binding.
pub const DEFAULT_BIND_RADIUS: f64 = 80.0;

/// Suffix of the text element generated from a `label`.
pub const LABEL_SUFFIX: &str = "_label";

const DEFAULT_STROKE_WIDTH: f64 = 2.0;
const DEFAULT_ROUGHNESS: f64 = 1.0;
const DEFAULT_ROUNDNESS: i64 = 3;
const LABEL_FONT_SIZE: f64 = 20.0;
const LABEL_LINE_HEIGHT: f64 = 1.25;

/// Absent, blank, or `transparent`.
#[must_use]
pub fn is_missing_color(value: Option<&str>) -> bool {
    value
        .map(str::trim)
        .is_none_or(|v| v.is_empty() || v.eq_ignore_ascii_case("transparent"))
}

// =============================================================================
// THEME
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Theme {
    pub dark: bool,
    /// Caller-preferred stroke; overrides the light/dark default when set.
    pub preferred_stroke: Option<String>,
}

impl Theme {
    #[must_use]
    pub fn default_stroke(&self) -> &str {
        match self.preferred_stroke.as_deref() {
            Some(color) if !is_missing_color(Some(color)) => color,
            _ if self.dark => DARK_STROKE,
            _ => LIGHT_STROKE,
        }
    }
}

// =============================================================================
// NORMALIZER
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Normalizer {
    pub theme: Theme,
    pub bind_radius: f64,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(Theme::default())
    }
}

impl Normalizer {
    #[must_use]
    pub fn new(theme: Theme) -> Self {
        Self { theme, bind_radius: DEFAULT_BIND_RADIUS }
    }

    #[must_use]
    pub fn with_bind_radius(mut self, bind_radius: f64) -> Self {
        self.bind_radius = bind_radius;
        self
    }

    /// Apply every rule, in order, to one self-contained batch.
    #[must_use]
    pub fn normalize(&self, elements: Vec<Element>) -> Vec<Element> {
        self.run(elements, 0).0
    }

    /// Normalize the next batch of a stream against everything `context`
    /// has already emitted.
    #[must_use]
    pub fn normalize_with(&self, context: &mut NormalizeContext, batch: Vec<Element>) -> NormalizedBatch {
        if batch.is_empty() {
            return NormalizedBatch::default();
        }
        let known = context.emitted.len();
        let before = context.emitted.clone();
        let mut all = std::mem::take(&mut context.emitted);
        all.extend(batch);

        let (all, next_swatch) = self.run(all, context.next_swatch);
        let updated: Vec<Element> = all[..known]
            .iter()
            .zip(&before)
            .filter(|(after, before)| after != before)
            .map(|(after, _)| after.clone())
            .collect();
        let elements = all[known..].to_vec();
        if !updated.is_empty() {
            tracing::debug!(updated = updated.len(), "normalize: earlier elements relinked");
        }

        context.emitted = all;
        context.next_swatch = next_swatch;
        NormalizedBatch { elements, updated }
    }

    /// Run every rule; the palette starts at `first_swatch`. Returns the next cursor.
    fn run(&self, elements: Vec<Element>, first_swatch: usize) -> (Vec<Element>, usize) {
        let mut elements = expand_labels(elements);
        let next_swatch = paint_shapes(&mut elements, first_swatch);
        self.stroke_text(&mut elements);
        let bound = self.bind_connectors(&mut elements);
        link_bound_elements(&mut elements);
        let attached = attach_text(&mut elements);
        for element in &mut elements {
            element.prune_shadowed_nulls();
        }

        tracing::debug!(
            elements = elements.len(),
            painted = next_swatch - first_swatch,
            bound,
            attached,
            "normalize: batch done"
        );
        (elements, next_swatch)
    }

    fn stroke_text(&self, elements: &mut [Element]) {
        let strokes: HashMap<String, String> = elements
            .iter()
            .filter(|e| e.kind.is_shape())
            .filter_map(|e| Some((e.id.clone(), e.style.stroke_color.clone()?)))
            .collect();

        for element in elements.iter_mut().filter(|e| e.kind.text().is_some()) {
            if !is_missing_color(element.style.stroke_color.as_deref()) {
                continue;
            }
            let inherited = element.container_id().and_then(|id| strokes.get(id)).cloned();
            element.style.stroke_color = Some(inherited.unwrap_or_else(|| self.theme.default_stroke().to_owned()));
        }
    }

    fn bind_connectors(&self, elements: &mut [Element]) -> usize {
        let shapes: Vec<ShapeInfo> = elements
            .iter()
            .filter(|e| e.kind.is_shape())
            .map(|e| ShapeInfo { id: e.id.clone(), bounds: e.bounds(), stroke: e.style.stroke_color.clone() })
            .collect();
        let default_stroke = self.theme.default_stroke();
        let mut registrations: Vec<(usize, String)> = Vec::new();
        let mut bound = 0;

        for element in elements.iter_mut() {
            if !element.kind.is_connector() {
                continue;
            }
            apply_connector_defaults(element);
            if matches!(element.kind, ElementKind::Line(_)) {
                if is_missing_color(element.style.stroke_color.as_deref()) {
                    element.style.stroke_color = Some(default_stroke.to_owned());
                }
                continue;
            }

            let Some((start, end)) = element.endpoints() else { continue };
            let arrow_id = element.id.clone();
            let Some(linear) = element.kind.linear_mut() else { continue };

            let mut resolve = |binding: &mut Option<Binding>, point: (f64, f64), end_name: &str| -> Option<usize> {
                if let Some(existing) = binding {
                    return shapes.iter().position(|s| s.id == existing.element_id);
                }
                let found = self.nearest_shape(&shapes, point)?;
                tracing::debug!(arrow = %arrow_id, shape = %shapes[found].id, end = end_name, "normalize: auto-bound");
                *binding = Some(Binding::to(shapes[found].id.clone()));
                bound += 1;
                Some(found)
            };
            let start_shape = resolve(&mut linear.start_binding, start, "start");
            let end_shape = resolve(&mut linear.end_binding, end, "end");

            for shape in [start_shape, end_shape].into_iter().flatten() {
                registrations.push((shape, arrow_id.clone()));
            }
            if is_missing_color(element.style.stroke_color.as_deref()) {
                let inherited = [start_shape, end_shape]
                    .into_iter()
                    .flatten()
                    .find_map(|i| shapes[i].stroke.clone());
                element.style.stroke_color = Some(inherited.unwrap_or_else(|| default_stroke.to_owned()));
            }
        }

        for (shape, arrow_id) in registrations {
            if let Some(host) = elements.iter_mut().find(|e| e.id == shapes[shape].id) {
                host.add_bound(&arrow_id, "arrow");
            }
        }
        bound
    }

    /// Closest shape by edge distance within the radius; ties go to the nearer center.
    fn nearest_shape(&self, shapes: &[ShapeInfo], (px, py): (f64, f64)) -> Option<usize> {
        shapes
            .iter()
            .enumerate()
            .map(|(i, s)| (i, s.bounds.distance_to(px, py), s.bounds.center_distance(px, py)))
            .filter(|(_, distance, _)| *distance <= self.bind_radius)
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.2.total_cmp(&b.2)))
            .map(|(i, _, _)| i)
    }
}

/// Stream state carried between [`Normalizer::normalize_with`] calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeContext {
    emitted: Vec<Element>,
    next_swatch: usize,
}

impl NormalizeContext {
    /// Latest version of every element emitted so far, in emission order.
    #[must_use]
    pub fn emitted(&self) -> &[Element] {
        &self.emitted
    }
}

/// One normalized stream batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    /// The batch's own elements, label text included.
    pub elements: Vec<Element>,
    /// Elements from earlier batches changed by this one, latest version.
    pub updated: Vec<Element>,
}

struct ShapeInfo {
    id: String,
    bounds: Bounds,
    stroke: Option<String>,
}

fn apply_connector_defaults(element: &mut Element) {
    element.style.stroke_width.get_or_insert(DEFAULT_STROKE_WIDTH);
    element.style.roughness.get_or_insert(DEFAULT_ROUGHNESS);
}

// =============================================================================
// RULES
// =============================================================================

struct LabelSpec {
    text: String,
    font_size: Option<f64>,
    stroke: Option<String>,
}

fn label_spec(value: &Value) -> Option<LabelSpec> {
    let spec = match value {
        Value::String(text) => LabelSpec { text: text.clone(), font_size: None, stroke: None },
        Value::Object(map) => LabelSpec {
            text: map.get("text")?.as_str()?.to_owned(),
            font_size: map.get("fontSize").and_then(Value::as_f64),
            stroke: map.get("strokeColor").and_then(Value::as_str).map(str::to_owned),
        },
        _ => return None,
    };
    (!spec.text.trim().is_empty()).then_some(spec)
}

/// Turn `label` attributes on shapes and arrows into bound text elements.
fn expand_labels(elements: Vec<Element>) -> Vec<Element> {
    let existing: HashSet<String> = elements.iter().map(|e| e.id.clone()).collect();
    let mut out = Vec::with_capacity(elements.len());

    for mut host in elements {
        let can_host = host.kind.is_shape() || matches!(host.kind, ElementKind::Arrow(_));
        let spec = if can_host { host.extra.get("label").and_then(label_spec) } else { None };
        let Some(spec) = spec else {
            out.push(host);
            continue;
        };
        host.extra.remove("label");

        let label_id = format!("{}{LABEL_SUFFIX}", host.id);
        if existing.contains(&label_id) {
            out.push(host);
            continue;
        }
        let label = label_element(&host, &label_id, spec);
        host.add_bound(&label_id, "text");
        out.push(host);
        out.push(label);
    }
    out
}

fn label_element(host: &Element, id: &str, spec: LabelSpec) -> Element {
    let font_size = spec.font_size.unwrap_or(LABEL_FONT_SIZE);
    let (width, height) = estimate_text_size(&spec.text, font_size, LABEL_LINE_HEIGHT);
    let (cx, cy) = host.midpoint().unwrap_or_else(|| host.bounds().center());

    let props = TextProps {
        text: Some(spec.text.clone()),
        font_size: Some(font_size),
        font_family: Some(1),
        text_align: Some("center".to_owned()),
        vertical_align: Some("middle".to_owned()),
        container_id: Some(host.id.clone()),
        original_text: Some(spec.text),
        line_height: Some(LABEL_LINE_HEIGHT),
        ..TextProps::default()
    };
    let mut label = Element::new(id, ElementKind::Text(props), cx - width / 2.0, cy - height / 2.0, width, height);
    label.style.stroke_color = spec.stroke;
    // Sorts directly after the host.
    label.meta.index = host.meta.index.as_ref().map(|index| format!("{index}V"));
    label
}

/// Give shapes missing stroke or fill the next palette swatch, plus shape defaults.
fn paint_shapes(elements: &mut [Element], first_swatch: usize) -> usize {
    let mut next = first_swatch;
    for element in elements.iter_mut().filter(|e| e.kind.is_shape()) {
        let style = &mut element.style;
        let stroke_missing = is_missing_color(style.stroke_color.as_deref());
        let fill_missing = is_missing_color(style.background_color.as_deref());
        if stroke_missing || fill_missing {
            let swatch = PALETTE[next % PALETTE.len()];
            next += 1;
            if stroke_missing {
                style.stroke_color = Some(swatch.stroke.to_owned());
            }
            if fill_missing {
                style.background_color = Some(swatch.fill.to_owned());
            }
        }
        style.fill_style.get_or_insert_with(|| "solid".to_owned());
        style.stroke_width.get_or_insert(DEFAULT_STROKE_WIDTH);
        style.roughness.get_or_insert(DEFAULT_ROUGHNESS);
        style.roundness.get_or_insert(Roundness { kind: DEFAULT_ROUNDNESS, value: None });
    }
    next
}

/// Upgrade bare bound ids to `{id, type}` and drop duplicate entries.
fn link_bound_elements(elements: &mut [Element]) {
    let kinds: HashMap<String, String> = elements.iter().map(|e| (e.id.clone(), e.type_name().to_owned())).collect();

    for element in elements.iter_mut() {
        let Some(list) = element.bound_elements.as_mut() else { continue };
        for entry in list.iter_mut() {
            if let BoundElement::Bare(id) = entry {
                let linked = kinds.get(id.as_str()).map(|kind| BoundElement::Linked { id: id.clone(), kind: kind.clone() });
                if let Some(linked) = linked {
                    *entry = linked;
                }
            }
        }
        let mut seen = HashSet::new();
        list.retain(|entry| seen.insert(entry.id().to_owned()));
    }
}

/// Register contained text on its host and center it there.
fn attach_text(elements: &mut [Element]) -> usize {
    let positions: HashMap<String, usize> = elements.iter().enumerate().map(|(i, e)| (e.id.clone(), i)).collect();
    let links: Vec<(usize, usize)> = elements
        .iter()
        .enumerate()
        .filter_map(|(i, e)| {
            let host = *positions.get(e.container_id()?)?;
            (host != i).then_some((i, host))
        })
        .collect();

    for &(text, host) in &links {
        let text_id = elements[text].id.clone();
        elements[host].add_bound(&text_id, "text");

        let host = &elements[host];
        let anchor = if host.kind.is_shape() {
            let bounds = host.bounds();
            Some((bounds.center(), Some(bounds.width)))
        } else {
            host.midpoint().map(|mid| (mid, None))
        };
        let Some(((cx, cy), max_width)) = anchor else { continue };

        let text = &mut elements[text];
        if let Some(max_width) = max_width {
            text.width = text.width.min(max_width);
        }
        text.x = cx - text.width / 2.0;
        text.y = cy - text.height / 2.0;
    }
    links.len()
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
