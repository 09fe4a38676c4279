//! Reflected uniform storage.
//!
//! A uniform *group* is everything under one root identifier
//! (`u_Environment`, `u_Transform`, or a lone `u_Color`). Each group owns a
//! CPU buffer and a sparse member tree keyed by [`PathSegment`]s, so
//! `u_Environment.Lights[3].Color` resolves by walking
//! `Lights → [3] → Color` instead of hashing dotted strings.

use std::fmt;

use glam::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::errors::{LumenError, Result};
use crate::renderer::layout::{DataType, split_name};

// ============================================================================
// Paths
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Field(String),
    Index(u32),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.write_str(name),
            Self::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// A parsed uniform name: the group root plus member segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniformPath {
    root: String,
    members: SmallVec<[PathSegment; 4]>,
}

impl UniformPath {
    /// Parses `root(.field | [index])*`.
    pub fn parse(name: &str) -> Result<Self> {
        let invalid = || LumenError::InvariantViolation(format!("malformed uniform name '{name}'"));
        let (root, mut rest) = split_name(name);
        if root.is_empty() {
            return Err(invalid());
        }
        let mut members = SmallVec::new();
        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('[') {
                let close = after.find(']').ok_or_else(invalid)?;
                let index = after[..close].trim().parse().map_err(|_| invalid())?;
                members.push(PathSegment::Index(index));
                rest = &after[close + 1..];
                rest = rest.strip_prefix('.').unwrap_or(rest);
            } else {
                let (field, tail) = split_name(rest);
                if field.is_empty() {
                    return Err(invalid());
                }
                members.push(PathSegment::Field(field.to_string()));
                rest = tail;
            }
        }
        Ok(Self {
            root: root.to_string(),
            members,
        })
    }

    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    #[must_use]
    pub fn members(&self) -> &[PathSegment] {
        &self.members
    }
}

impl fmt::Display for UniformPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root)?;
        for segment in &self.members {
            match segment {
                PathSegment::Field(name) => write!(f, ".{name}")?,
                PathSegment::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

// ============================================================================
// Values
// ============================================================================

/// How a backend lays out group buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UniformPacking {
    /// Elements back to back with their natural sizes.
    #[default]
    Tight,
    /// Uniform-buffer rules: `mat3` columns are padded to 16 bytes.
    Aligned,
}

impl UniformPacking {
    #[must_use]
    pub const fn size_of(self, ty: DataType) -> u32 {
        match (self, ty) {
            (Self::Aligned, DataType::Mat3) => 48,
            _ => ty.size(),
        }
    }

    const fn column_stride(self, ty: DataType) -> usize {
        match (self, ty) {
            (Self::Aligned, DataType::Mat3) => 16,
            (_, DataType::Mat2) => 8,
            (_, DataType::Mat3) => 12,
            _ => 16,
        }
    }
}

/// A typed uniform value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat2(Mat2),
    Mat3(Mat3),
    Mat4(Mat4),
}

impl UniformValue {
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::Bool(_) => DataType::Bool,
            Self::Int(_) => DataType::Int,
            Self::Float(_) => DataType::Float,
            Self::Vec2(_) => DataType::Vec2,
            Self::Vec3(_) => DataType::Vec3,
            Self::Vec4(_) => DataType::Vec4,
            Self::Mat2(_) => DataType::Mat2,
            Self::Mat3(_) => DataType::Mat3,
            Self::Mat4(_) => DataType::Mat4,
        }
    }

    /// Scalars as floats, column-major for matrices.
    fn floats(&self) -> SmallVec<[f32; 16]> {
        match self {
            Self::Bool(_) | Self::Int(_) => SmallVec::new(),
            Self::Float(v) => SmallVec::from_slice(&[*v]),
            Self::Vec2(v) => SmallVec::from_slice(&v.to_array()),
            Self::Vec3(v) => SmallVec::from_slice(&v.to_array()),
            Self::Vec4(v) => SmallVec::from_slice(&v.to_array()),
            Self::Mat2(m) => SmallVec::from_slice(&m.to_cols_array()),
            Self::Mat3(m) => SmallVec::from_slice(&m.to_cols_array()),
            Self::Mat4(m) => SmallVec::from_slice(&m.to_cols_array()),
        }
    }

    /// Encodes the value for a group buffer.
    #[must_use]
    pub fn encode(&self, packing: UniformPacking) -> SmallVec<[u8; 64]> {
        let ty = self.data_type();
        let mut out: SmallVec<[u8; 64]> = SmallVec::from_elem(0, packing.size_of(ty) as usize);
        match self {
            Self::Bool(v) => out[..4].copy_from_slice(&i32::from(*v).to_le_bytes()),
            Self::Int(v) => out[..4].copy_from_slice(&v.to_le_bytes()),
            _ => {
                let floats = self.floats();
                let rows = (ty.component_count() / ty.columns()) as usize;
                let stride = if ty.is_matrix() { packing.column_stride(ty) } else { 0 };
                for (i, f) in floats.iter().enumerate() {
                    let (column, row) = (i / rows, i % rows);
                    let at = column * stride + row * 4;
                    out[at..at + 4].copy_from_slice(&f.to_le_bytes());
                }
            }
        }
        out
    }

    /// Decodes a value of type `ty` from a group buffer slice.
    #[must_use]
    pub fn decode(ty: DataType, bytes: &[u8], packing: UniformPacking) -> Option<Self> {
        if bytes.len() < packing.size_of(ty) as usize {
            return None;
        }
        let word = |at: usize| [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]];
        let float = |at: usize| f32::from_le_bytes(word(at));
        let rows = (ty.component_count() / ty.columns().max(1)) as usize;
        let stride = packing.column_stride(ty);
        let matrix = |n: usize| -> SmallVec<[f32; 16]> {
            (0..n).map(|i| float((i / rows) * stride + (i % rows) * 4)).collect()
        };
        Some(match ty {
            DataType::None => return None,
            DataType::Bool => Self::Bool(i32::from_le_bytes(word(0)) != 0),
            DataType::Int => Self::Int(i32::from_le_bytes(word(0))),
            DataType::Float => Self::Float(float(0)),
            DataType::Vec2 => Self::Vec2(Vec2::new(float(0), float(4))),
            DataType::Vec3 => Self::Vec3(Vec3::new(float(0), float(4), float(8))),
            DataType::Vec4 => Self::Vec4(Vec4::new(float(0), float(4), float(8), float(12))),
            DataType::Mat2 => Self::Mat2(Mat2::from_cols_slice(&matrix(4))),
            DataType::Mat3 => Self::Mat3(Mat3::from_cols_slice(&matrix(9))),
            DataType::Mat4 => Self::Mat4(Mat4::from_cols_slice(&matrix(16))),
        })
    }

    /// Whether a value of this variant may be written to an element of `ty`.
    #[must_use]
    pub fn fits(&self, ty: DataType) -> bool {
        let own = self.data_type();
        own == ty || (own.is_integer() && ty.is_integer())
    }
}

macro_rules! impl_uniform_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for UniformValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_uniform_from! {
    bool => Bool,
    i32 => Int,
    f32 => Float,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    Mat2 => Mat2,
    Mat3 => Mat3,
    Mat4 => Mat4,
}

// ============================================================================
// Elements and groups
// ============================================================================

/// One reflected uniform leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformElement {
    pub ty: DataType,
    /// Program location on backends that upload by location.
    pub location: Option<u32>,
    /// Byte offset inside the group buffer.
    pub offset: u32,
    pub size: u32,
}

/// A node of the member tree.
#[derive(Debug, Clone, Default)]
pub struct UniformMember {
    pub element: Option<UniformElement>,
    children: FxHashMap<PathSegment, UniformMember>,
}

impl UniformMember {
    fn insert(&mut self, path: &[PathSegment], element: UniformElement) {
        match path.split_first() {
            None => self.element = Some(element),
            Some((head, tail)) => self
                .children
                .entry(head.clone())
                .or_default()
                .insert(tail, element),
        }
    }

    #[must_use]
    pub fn find(&self, path: &[PathSegment]) -> Option<&UniformMember> {
        match path.split_first() {
            None => Some(self),
            Some((head, tail)) => self.children.get(head)?.find(tail),
        }
    }

    #[must_use]
    pub fn child(&self, segment: &PathSegment) -> Option<&UniformMember> {
        self.children.get(segment)
    }

    #[must_use]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Buffer binding of a group on backends that bind uniform buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupBinding {
    pub group: u32,
    pub binding: u32,
}

/// All uniforms under one root name.
#[derive(Debug, Clone)]
pub struct Uniform {
    name: String,
    data: Vec<u8>,
    root: UniformMember,
    dirty: bool,
    binding: Option<GroupBinding>,
}

impl Uniform {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Vec::new(),
            root: UniformMember::default(),
            dirty: false,
            binding: None,
        }
    }

    /// A group with a fixed buffer size and binding, as reflected from a
    /// uniform block.
    #[must_use]
    pub fn with_binding(name: impl Into<String>, size: u32, binding: GroupBinding) -> Self {
        Self {
            data: vec![0; size as usize],
            binding: Some(binding),
            ..Self::new(name)
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }

    #[must_use]
    pub fn binding(&self) -> Option<GroupBinding> {
        self.binding
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    #[must_use]
    pub fn root(&self) -> &UniformMember {
        &self.root
    }

    /// Registers a leaf; the buffer grows to cover it.
    pub fn insert(&mut self, members: &[PathSegment], element: UniformElement) {
        let end = (element.offset + element.size) as usize;
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.root.insert(members, element);
    }

    #[must_use]
    pub fn element(&self, members: &[PathSegment]) -> Option<UniformElement> {
        self.root.find(members)?.element
    }

    fn write(&mut self, element: &UniformElement, bytes: &[u8]) {
        let start = element.offset as usize;
        let end = (start + bytes.len()).min(start + element.size as usize);
        self.data[start..end].copy_from_slice(&bytes[..end - start]);
        self.dirty = true;
    }
}

// ============================================================================
// Library
// ============================================================================

/// Every uniform group of one shader.
#[derive(Debug, Clone, Default)]
pub struct UniformLibrary {
    packing: UniformPacking,
    groups: Vec<Uniform>,
    index: FxHashMap<String, usize>,
    reported: FxHashSet<String>,
}

impl UniformLibrary {
    #[must_use]
    pub fn new(packing: UniformPacking) -> Self {
        Self {
            packing,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn packing(&self) -> UniformPacking {
        self.packing
    }

    /// Adds a group reflected as a block. Replaces a group of the same name.
    pub fn add_group(&mut self, group: Uniform) {
        if let Some(&i) = self.index.get(group.name()) {
            self.groups[i] = group;
        } else {
            self.index.insert(group.name().to_string(), self.groups.len());
            self.groups.push(group);
        }
    }

    /// Appends a leaf at the end of its group's buffer, creating the group
    /// on first use. Offsets are the running sum of prior element sizes.
    pub fn push_element(&mut self, name: &str, ty: DataType, location: Option<u32>) -> Result<UniformElement> {
        let path = UniformPath::parse(name)?;
        let size = self.packing.size_of(ty);
        let group = self.group_entry(path.root());
        let element = UniformElement {
            ty,
            location,
            offset: group.size(),
            size,
        };
        group.insert(path.members(), element);
        Ok(element)
    }

    /// Registers a leaf at an explicit offset.
    pub fn insert_element(&mut self, name: &str, element: UniformElement) -> Result<()> {
        let path = UniformPath::parse(name)?;
        self.group_entry(path.root()).insert(path.members(), element);
        Ok(())
    }

    fn group_entry(&mut self, root: &str) -> &mut Uniform {
        let i = match self.index.get(root) {
            Some(&i) => i,
            None => {
                self.index.insert(root.to_string(), self.groups.len());
                self.groups.push(Uniform::new(root));
                self.groups.len() - 1
            }
        };
        &mut self.groups[i]
    }

    #[must_use]
    pub fn group(&self, name: &str) -> Option<&Uniform> {
        self.index.get(name).map(|&i| &self.groups[i])
    }

    #[must_use]
    pub fn group_mut(&mut self, name: &str) -> Option<&mut Uniform> {
        self.index.get(name).map(|&i| &mut self.groups[i])
    }

    pub fn groups(&self) -> impl Iterator<Item = &Uniform> {
        self.groups.iter()
    }

    pub fn groups_mut(&mut self) -> impl Iterator<Item = &mut Uniform> {
        self.groups.iter_mut()
    }

    /// Resolves a dotted name to its leaf.
    #[must_use]
    pub fn element(&self, name: &str) -> Option<UniformElement> {
        let path = UniformPath::parse(name).ok()?;
        self.group(path.root())?.element(path.members())
    }

    /// True for leaves and for interior nodes (structs, arrays).
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        UniformPath::parse(name)
            .ok()
            .and_then(|path| self.group(path.root())?.root().find(path.members()).map(|_| ()))
            .is_some()
    }

    /// Writes `value` into its group buffer and marks the group dirty.
    ///
    /// Unknown names and type mismatches warn once per name and return
    /// `None`.
    pub fn set(&mut self, name: &str, value: UniformValue) -> Option<UniformElement> {
        let Some(element) = self.element(name) else {
            self.report_missing(name, "uniform not found");
            return None;
        };
        if !value.fits(element.ty) {
            self.report_missing(
                name,
                &format!("type mismatch ({:?} written to {:?})", value.data_type(), element.ty),
            );
            return None;
        }
        let bytes = value.encode(self.packing);
        let root = UniformPath::parse(name).ok()?.root;
        if let Some(group) = self.group_mut(&root) {
            group.write(&element, &bytes);
        }
        Some(element)
    }

    /// Reads a leaf back from its CPU buffer.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<UniformValue> {
        let path = UniformPath::parse(name).ok()?;
        let group = self.group(path.root())?;
        let element = group.element(path.members())?;
        let start = element.offset as usize;
        UniformValue::decode(element.ty, &group.data()[start..], self.packing)
    }

    /// Logs a soft binding miss the first time it happens for `name`.
    pub fn report_missing(&mut self, name: &str, reason: &str) {
        if self.reported.insert(name.to_string()) {
            log::warn!("Uniform '{name}': {reason}");
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_array_paths() {
        let path = UniformPath::parse("u_Environment.Lights[12].Color").unwrap();
        assert_eq!(path.root(), "u_Environment");
        assert_eq!(
            path.members(),
            [
                PathSegment::Field("Lights".into()),
                PathSegment::Index(12),
                PathSegment::Field("Color".into()),
            ]
        );
        assert_eq!(path.to_string(), "u_Environment.Lights[12].Color");
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(UniformPath::parse("").is_err());
        assert!(UniformPath::parse("u_A[x]").is_err());
        assert!(UniformPath::parse("u_A[1").is_err());
        assert!(UniformPath::parse("u_A..B").is_err());
    }

    #[test]
    fn aligned_mat3_pads_columns() {
        let m = Mat3::from_cols_array(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        let bytes = UniformValue::Mat3(m).encode(UniformPacking::Aligned);
        assert_eq!(bytes.len(), 48);
        assert_eq!(f32::from_le_bytes(bytes[16..20].try_into().unwrap()), 4.0);
        let back = UniformValue::decode(DataType::Mat3, &bytes, UniformPacking::Aligned);
        assert_eq!(back, Some(UniformValue::Mat3(m)));
    }

    #[test]
    fn missing_uniform_is_reported_once() {
        let mut lib = UniformLibrary::new(UniformPacking::Tight);
        assert!(lib.set("u_Missing", UniformValue::Float(1.0)).is_none());
        assert!(lib.set("u_Missing", UniformValue::Float(1.0)).is_none());
        assert_eq!(lib.reported.len(), 1);
    }
}
