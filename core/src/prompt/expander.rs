//! Request expansion: imperial lengths to millimeters, part-type requirements.

use crate::units::LengthUnit;

struct PartType {
    keywords: &'static [&'static str],
    constraints: &'static [&'static str],
}

const PART_TYPES: &[PartType] = &[
    PartType {
        keywords: &["clamp", "pipe clamp", "repair clamp", "hose clamp", "c-clamp"],
        constraints: &[
            "Geometric requirements for clamp:",
            "- Bore diameter must match the pipe/hose outer diameter",
            "- Wall thickness: minimum 5mm for structural integrity",
            "- Flange width: at least 15mm on each side of the gap opening",
            "- Bolt holes: 2-4 holes through the flanges, typically 4mm radius",
            "- C-shape gap: 8-12mm opening width",
            "- Boolean overlap: all cutting geometry must use PARAMS.overlap",
            "- Use segments: 48 for main shell cylinder",
        ],
    },
    PartType {
        keywords: &["bracket", "mounting bracket", "handrail bracket", "wall bracket", "l-bracket", "angle bracket"],
        constraints: &[
            "Geometric requirements for bracket:",
            "- L-shape construction: vertical plate + horizontal plate",
            "- Plate thickness: minimum 5mm",
            "- Add a gusset/brace between the two plates for structural support",
            "- Bolt hole pattern: at least 2 holes per plate face",
            "- Bolt holes typically 3-5mm radius",
            "- Boolean overlap: all cutting geometry must use PARAMS.overlap",
        ],
    },
    PartType {
        keywords: &["housing", "junction box", "enclosure", "box", "case", "casing"],
        constraints: &[
            "Geometric requirements for housing/enclosure:",
            "- Hollow interior created by subtracting a smaller cuboid from the outer shell",
            "- Wall thickness: minimum 3mm on all sides",
            "- Lid lip: 2-3mm raised rim around the top opening",
            "- Conduit/cable holes on at least one side wall",
            "- Conduit holes typically 10-15mm radius",
            "- Boolean overlap: all cutting geometry must use PARAMS.overlap",
        ],
    },
    PartType {
        keywords: &["clip", "cable clip", "wire clip", "cable management", "snap clip", "retention clip"],
        constraints: &[
            "Geometric requirements for clip:",
            "- Channel opening (snap-fit gap) at the top: 10-15mm width",
            "- Wall thickness around the channel: minimum 3mm",
            "- Flat mounting base at the bottom with screw holes",
            "- Mounting holes: 2-3mm radius, at least 2 holes",
            "- Channel diameter must match cable/pipe diameter",
            "- Boolean overlap: all cutting geometry must use PARAMS.overlap",
            "- Use segments: 48 for clip body cylinder",
        ],
    },
    PartType {
        keywords: &["collar", "pipe collar", "shaft collar", "ring", "flange collar"],
        constraints: &[
            "Geometric requirements for collar:",
            "- Inner radius must match the pipe/shaft outer radius exactly",
            "- Wall thickness: minimum 4mm",
            "- Mounting tab extending outward with bolt holes",
            "- Tab bolt holes: 3-4mm radius",
            "- Boolean overlap: all cutting geometry must use PARAMS.overlap",
            "- Use segments: 48 for collar body cylinders",
        ],
    },
    PartType {
        keywords: &["saddle", "conduit saddle", "pipe saddle", "pipe support"],
        constraints: &[
            "Geometric requirements for saddle:",
            "- Half-round channel to cradle the pipe",
            "- Flat base with mounting holes on each side",
            "- Channel radius matches pipe outer diameter",
            "- Base width: pipe diameter + 20mm minimum per side",
            "- Mounting holes: 3-4mm radius",
            "- Boolean overlap: all cutting geometry must use PARAMS.overlap",
        ],
    },
];

/// Result of expanding a request.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedPrompt {
    pub text: String,
    /// Converted lengths in millimeters, in order of appearance.
    pub extracted_mm: Vec<f64>,
    pub was_expanded: bool,
}

/// Suffix spellings per unit, longest first so `inches` wins over `inch`.
const SUFFIXES: &[(&str, bool)] = &[
    ("inches", false),
    ("inch", false),
    ("in", true),
    ("\"", false),
    ("foot", false),
    ("feet", false),
    ("ft", true),
    ("'", false),
];

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Match an imperial suffix at the start of `rest`. Returns the unit and byte length.
fn match_suffix(rest: &str) -> Option<(LengthUnit, usize)> {
    let lower = rest.to_ascii_lowercase();
    for (suffix, needs_boundary) in SUFFIXES {
        if !lower.starts_with(suffix) {
            continue;
        }
        if *needs_boundary && lower[suffix.len()..].chars().next().is_some_and(is_word_char) {
            continue;
        }
        let unit = LengthUnit::from_suffix(suffix)?;
        return Some((unit, suffix.len()));
    }
    None
}

/// Rewrite `2 inches` as `2 inch (50.8mm)` and `3 ft` as `3 foot (914.4mm)`.
fn convert_imperial(input: &str) -> (String, Vec<f64>) {
    let mut out = String::with_capacity(input.len());
    let mut extracted = Vec::new();
    let mut i = 0;

    while i < input.len() {
        let rest = &input[i..];
        let Some(c) = rest.chars().next() else { break };
        if c.is_ascii_digit() {
            let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            let mut number_len = digits;
            if rest[digits..].starts_with('.') {
                let fraction = rest[digits + 1..]
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(rest.len() - digits - 1);
                if fraction > 0 {
                    number_len = digits + 1 + fraction;
                }
            }
            let number = &rest[..number_len];
            let after = &rest[number_len..];
            let gap = after.len() - after.trim_start().len();
            if let Some((unit, suffix_len)) = match_suffix(&after[gap..]) {
                if let Ok(value) = number.parse::<f64>() {
                    let mm = unit.to_mm(value);
                    extracted.push(mm);
                    out.push_str(&format!("{} {} ({:.1}mm)", number, unit.name(), mm));
                    i += number_len + gap + suffix_len;
                    continue;
                }
            }
        }
        out.push(c);
        i += c.len_utf8();
    }
    (out, extracted)
}

fn part_constraints(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    PART_TYPES
        .iter()
        .find(|part| part.keywords.iter().any(|k| lower.contains(k)))
        .map(|part| part.constraints.join("\n"))
}

/// Expand a short request into a fuller geometric brief.
pub fn expand_prompt(input: &str) -> ExpandedPrompt {
    let (metric, extracted_mm) = convert_imperial(input);
    let constraints = part_constraints(&metric);

    if extracted_mm.is_empty() && constraints.is_none() {
        return ExpandedPrompt {
            text: input.to_string(),
            extracted_mm,
            was_expanded: false,
        };
    }

    let mut text = metric;
    if let Some(constraints) = constraints {
        text.push_str("\n\n");
        text.push_str(&constraints);
    }
    ExpandedPrompt {
        text,
        extracted_mm,
        was_expanded: true,
    }
}
