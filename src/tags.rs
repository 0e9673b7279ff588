//! Tag vocabulary tables.
//!
//! Classifies tag names into the renderable HTML set, the SVG graphics set,
//! the raw-text set (content is consumed verbatim until the literal close
//! sequence) and the direct-text parents (text children become text nodes
//! instead of auto-wrapped spans). The composite tag is reserved.

/// The reserved composite tag: a child slot owning a nested component
/// instead of a single document node.
pub const COMPOSITE_TAG: &str = "Component";

static HTML_TAGS: &[&str] = &[
    "a", "abbr", "address", "area", "article", "aside", "audio", "b", "base",
    "bdi", "bdo", "blockquote", "body", "br", "button", "canvas", "caption",
    "cite", "code", "col", "colgroup", "data", "datalist", "dd", "del",
    "details", "dfn", "dialog", "div", "dl", "dt", "em", "embed", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5",
    "h6", "head", "header", "hgroup", "hr", "html", "i", "iframe", "img",
    "input", "ins", "kbd", "label", "legend", "li", "link", "main", "map",
    "mark", "menu", "meta", "meter", "nav", "noscript", "object", "ol",
    "optgroup", "option", "output", "p", "param", "picture", "pre",
    "progress", "q", "rb", "rp", "rt", "ruby", "s", "samp", "script",
    "section", "select", "slot", "small", "source", "span", "strong",
    "style", "sub", "summary", "sup", "table", "tbody", "td", "template",
    "textarea", "tfoot", "th", "thead", "time", "title", "tr", "track", "u",
    "ul", "var", "video", "wbr",
];

static SVG_TAGS: &[&str] = &[
    "animate", "animateMotion", "animateTransform", "circle", "clipPath",
    "defs", "desc", "ellipse", "feBlend", "feColorMatrix",
    "feComponentTransfer", "feComposite", "feConvolveMatrix",
    "feDiffuseLighting", "feDisplacementMap", "feDistantLight", "feFlood",
    "feGaussianBlur", "feImage", "feMerge", "feMergeNode", "feMorphology",
    "feOffset", "fePointLight", "feSpecularLighting", "feSpotLight",
    "feTile", "feTurbulence", "filter", "foreignObject", "g", "image",
    "line", "linearGradient", "marker", "mask", "metadata", "mpath", "path",
    "pattern", "polygon", "polyline", "radialGradient", "rect", "set",
    "stop", "svg", "switch", "symbol", "text", "textPath", "tspan", "use",
    "view",
];

/// Tags whose content is scanned as verbatim text until the matching
/// literal close sequence.
static RAW_TEXT_TAGS: &[&str] = &["pre", "script", "style", "textarea"];

/// Tags whose text children are appended as real text nodes. Everything
/// else gets text wrapped in an auto-named span.
static DIRECT_TEXT_TAGS: &[&str] = &[
    "option", "pre", "script", "span", "style", "textarea",
];

pub fn is_html(tag: &str) -> bool {
    HTML_TAGS.contains(&tag)
}

pub fn is_svg(tag: &str) -> bool {
    SVG_TAGS.contains(&tag)
}

/// A primitive renderable tag: owns exactly one document node.
pub fn is_primitive(tag: &str) -> bool {
    is_html(tag) || is_svg(tag)
}

pub fn is_raw_text(tag: &str) -> bool {
    RAW_TEXT_TAGS.contains(&tag.to_ascii_lowercase().as_str())
}

pub fn is_direct_text(tag: &str) -> bool {
    DIRECT_TEXT_TAGS.contains(&tag.to_ascii_lowercase().as_str())
}

pub fn is_composite(tag: &str) -> bool {
    tag == COMPOSITE_TAG || !is_primitive(tag)
}
