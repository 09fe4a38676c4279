//! Data-type layout shared by vertex attributes and uniform members.
//!
//! [`DataLayout`] is an insertion-ordered name → element mapping that assigns
//! each element's offset as the running sum of the sizes inserted before it.

use std::hash::Hash;

/// Shader-visible scalar, vector and matrix types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataType {
    #[default]
    None,
    /// Stored as a 32-bit integer, the way GPUs store booleans.
    Bool,
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

impl DataType {
    /// Tightly packed byte size.
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Bool | Self::Int | Self::Float => 4,
            Self::Vec2 => 8,
            Self::Vec3 => 12,
            Self::Vec4 | Self::Mat2 => 16,
            Self::Mat3 => 36,
            Self::Mat4 => 64,
        }
    }

    #[must_use]
    pub const fn component_count(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Bool | Self::Int | Self::Float => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 | Self::Mat2 => 4,
            Self::Mat3 => 9,
            Self::Mat4 => 16,
        }
    }

    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Bool | Self::Int)
    }

    #[must_use]
    pub const fn is_matrix(self) -> bool {
        matches!(self, Self::Mat2 | Self::Mat3 | Self::Mat4)
    }

    /// Number of columns for matrices, 1 otherwise.
    #[must_use]
    pub const fn columns(self) -> u32 {
        match self {
            Self::Mat2 => 2,
            Self::Mat3 => 3,
            Self::Mat4 => 4,
            _ => 1,
        }
    }
}

/// Something a [`DataLayout`] can place at an offset.
pub trait LayoutElement {
    fn size(&self) -> u32;
    fn set_offset(&mut self, offset: u32);
}

/// A vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataElement {
    pub ty: DataType,
    pub offset: u32,
    pub size: u32,
    pub normalized: bool,
}

impl DataElement {
    #[must_use]
    pub const fn new(ty: DataType) -> Self {
        Self {
            ty,
            offset: 0,
            size: ty.size(),
            normalized: false,
        }
    }

    #[must_use]
    pub const fn normalized(ty: DataType) -> Self {
        Self {
            normalized: true,
            ..Self::new(ty)
        }
    }
}

impl LayoutElement for DataElement {
    fn size(&self) -> u32 {
        self.size
    }

    fn set_offset(&mut self, offset: u32) {
        self.offset = offset;
    }
}

/// Insertion-ordered layout with automatic offsets.
///
/// Equality is order-sensitive: two layouts are equal when they hold the
/// same names and elements in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataLayout<T> {
    elements: Vec<(String, T)>,
    stride: u32,
}

impl<T> Default for DataLayout<T> {
    fn default() -> Self {
        Self {
            elements: Vec::new(),
            stride: 0,
        }
    }
}

impl<T: LayoutElement> DataLayout<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `element` at the current stride.
    pub fn add(&mut self, name: impl Into<String>, mut element: T) -> &mut Self {
        element.set_offset(self.stride);
        self.stride += element.size();
        self.elements.push((name.into(), element));
        self
    }

    /// Builder form of [`add`](Self::add).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, element: T) -> Self {
        self.add(name, element);
        self
    }

    #[must_use]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&T> {
        self.elements
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, e)| e)
    }

    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.elements.iter().map(|(n, e)| (n.as_str(), e))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Vertex-buffer layout. Hashable so it can key pipeline caches.
pub type BufferLayout = DataLayout<DataElement>;

impl BufferLayout {
    /// Builds a layout from `(name, type)` pairs in order.
    #[must_use]
    pub fn from_types<'a>(attributes: impl IntoIterator<Item = (&'a str, DataType)>) -> Self {
        let mut layout = Self::new();
        for (name, ty) in attributes {
            layout.add(name, DataElement::new(ty));
        }
        layout
    }
}

/// Splits a member name at the first `.` or `[`.
///
/// The head is the leading identifier. A `.` separator is dropped from the
/// tail, a `[` is kept so the caller still sees the array index:
/// `"Lights[0].Color"` → `("Lights", "[0].Color")`, `"Irradiance.Red"` →
/// `("Irradiance", "Red")`.
#[must_use]
pub fn split_name(name: &str) -> (&str, &str) {
    match name.find(['.', '[']) {
        Some(i) if name.as_bytes()[i] == b'.' => (&name[..i], &name[i + 1..]),
        Some(i) => (&name[..i], &name[i..]),
        None => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_on_dot_and_bracket() {
        assert_eq!(split_name("u_Material.Color"), ("u_Material", "Color"));
        assert_eq!(split_name("Lights[0].Color"), ("Lights", "[0].Color"));
        assert_eq!(split_name("u_Texture"), ("u_Texture", ""));
    }
}
