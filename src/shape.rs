//! Statically declared result shapes and their textual description.
//!
//! The categorization prompt tells the model what JSON to produce by showing
//! it a compact description of the target type. Shapes are declared by hand
//! through [`Describe`]; struct fields resolve their shape lazily so a type can
//! refer to itself without building an infinite descriptor.

use std::collections::HashSet;

/// Coarse structural type of a value.
#[derive(Debug, Clone)]
pub enum Shape {
    String,
    Number,
    Optional(Box<Shape>),
    List(Box<Shape>),
    Struct(StructShape),
}

impl Shape {
    pub fn list(inner: Shape) -> Self {
        Shape::List(Box::new(inner))
    }

    pub fn optional(inner: Shape) -> Self {
        Shape::Optional(Box::new(inner))
    }
}

#[derive(Debug, Clone)]
pub struct StructShape {
    pub name: &'static str,
    pub fields: Vec<Field>,
}

/// A named struct field. The shape is only built when the field is rendered.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    shape: fn() -> Shape,
}

impl Field {
    pub fn new(name: &'static str, shape: fn() -> Shape) -> Self {
        Self { name, shape }
    }

    pub fn shape(&self) -> Shape {
        (self.shape)()
    }
}

/// Types that can describe their own serialized shape.
pub trait Describe {
    fn shape() -> Shape;
}

/// Render the description of `T`'s shape.
pub fn describe_type<T: Describe>() -> String {
    describe(&T::shape())
}

/// Render a shape as text.
///
/// Each struct is expanded the first time it appears; later occurrences,
/// including recursive ones, are written as the bare struct name.
pub fn describe(shape: &Shape) -> String {
    let mut out = String::new();
    let mut visited = HashSet::new();
    render(shape, 0, &mut visited, &mut out);
    out
}

fn render(shape: &Shape, depth: usize, visited: &mut HashSet<&'static str>, out: &mut String) {
    match shape {
        Shape::String => out.push_str("string"),
        Shape::Number => out.push_str("number"),
        Shape::Optional(inner) => {
            render(inner, depth, visited, out);
            out.push('?');
        }
        Shape::List(inner) => {
            out.push('[');
            render(inner, depth, visited, out);
            out.push(']');
        }
        Shape::Struct(s) => {
            out.push_str(s.name);
            if !visited.insert(s.name) {
                return;
            }
            out.push_str(" {\n");
            for field in &s.fields {
                push_indent(depth + 1, out);
                out.push_str(field.name);
                out.push_str(": ");
                render(&field.shape(), depth + 1, visited, out);
                out.push('\n');
            }
            push_indent(depth, out);
            out.push('}');
        }
    }
}

fn push_indent(depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}
