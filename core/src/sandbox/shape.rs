//! Validated model output.

use std::slice;

use crate::kernel::Solid;
use crate::script::Value;

/// One colored, optionally named solid of a model.
#[derive(Debug, Clone)]
pub struct Part {
    pub solid: Solid,
    pub color: Option<String>,
    pub name: Option<String>,
}

impl Part {
    pub fn new(solid: Solid) -> Self {
        Self {
            solid,
            color: None,
            name: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// What a script returned, after validation.
#[derive(Debug, Clone)]
pub enum ModelShape {
    SingleSolid(Part),
    PartList(Vec<Part>),
}

impl ModelShape {
    pub fn parts(&self) -> &[Part] {
        match self {
            ModelShape::SingleSolid(part) => slice::from_ref(part),
            ModelShape::PartList(parts) => parts,
        }
    }

    pub fn into_parts(self) -> Vec<Part> {
        match self {
            ModelShape::SingleSolid(part) => vec![part],
            ModelShape::PartList(parts) => parts,
        }
    }

    pub fn part_count(&self) -> usize {
        self.parts().len()
    }
}

pub const SHAPE_MESSAGE: &str = "must return a solid or a list of {solid, color?, name?} parts";

/// Check a script's return value and convert it into a [`ModelShape`].
///
/// A list is accepted only if every element is valid; the first bad element is
/// named in the error.
pub fn validate_shape(value: &Value) -> Result<ModelShape, String> {
    match value {
        Value::Solid(solid) => Ok(ModelShape::SingleSolid(Part::new(solid.clone()))),
        Value::Array(items) => {
            let items = items.borrow();
            if items.is_empty() {
                return Err(SHAPE_MESSAGE.to_string());
            }
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    part_from(item).ok_or_else(|| {
                        format!("element {} is not a valid solid or {{solid, color?, name?}} part", i)
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(ModelShape::PartList)
        }
        _ => Err(SHAPE_MESSAGE.to_string()),
    }
}

fn part_from(value: &Value) -> Option<Part> {
    match value {
        Value::Solid(solid) => Some(Part::new(solid.clone())),
        Value::Object(object) => {
            let object = object.borrow();
            let solid = match object.get("solid").or_else(|| object.get("geometry"))? {
                Value::Solid(solid) => solid.clone(),
                _ => return None,
            };
            let text = |key: &str| -> Result<Option<String>, ()> {
                match object.get(key) {
                    None | Some(Value::Undefined) => Ok(None),
                    Some(Value::Str(s)) => Ok(Some(s.to_string())),
                    Some(_) => Err(()),
                }
            };
            Some(Part {
                solid,
                color: text("color").ok()?,
                name: text("name").ok()?,
            })
        }
        _ => None,
    }
}
