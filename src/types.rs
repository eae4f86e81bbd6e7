//! The C type system.
//!
//! Types are interned behind `Rc` so that `Type::Pointer`/`Type::Array`/
//! `Type::Function` nesting is cheap to clone and structural equality is
//! just a derived `PartialEq` on the tree. Struct/union identity is by
//! *defining declaration* (a unique tag id), not by structural shape, per
//! the data model: two structs with identical members but distinct tags
//! are never compatible.

use std::fmt;
use std::rc::Rc;

/// Signedness of an arithmetic type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signedness {
    Signed,
    Unsigned,
}

/// A member of a struct or union, with its byte offset already computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub ty: Type,
    pub offset: usize,
}

/// Kind of a tagged aggregate, kept distinct because redeclaring a tag
/// under a different kind in the same scope is an error (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggKind {
    Struct,
    Union,
}

/// The body of a struct/union type: `None` while incomplete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggDef {
    pub kind: AggKind,
    pub tag: Option<String>,
    /// Identity of the defining declaration. Two `AggDef`s are the same
    /// type iff they share a `tag_id`, never by structural comparison.
    pub tag_id: u32,
    pub members: Option<Rc<Vec<Member>>>,
}

/// Qualifiers that can attach to any type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Qualifiers {
    pub is_const: bool,
}

/// A C type. Cheap to clone: aggregates/pointees are `Rc`-shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Void,
    /// `_Bool`, `char`, `short`, `int`, `long` and their unsigned forms.
    /// `is_bool` distinguishes `_Bool` (width 1, values clamped to 0/1)
    /// from a plain unsigned `char`, which also has width 1.
    Arithmetic {
        signedness: Signedness,
        width: u8,
        is_bool: bool,
    },
    Pointer(Rc<Type>),
    Array {
        element: Rc<Type>,
        length: Option<usize>,
    },
    Function {
        ret: Rc<Type>,
        /// `None` = unspecified (unprototyped) parameter list.
        params: Option<Vec<Type>>,
    },
    Aggregate(Rc<AggDef>),
    /// A type that failed to resolve during a type error; propagates
    /// silently through further checks so one mistake does not cascade.
    Poison,
}

impl Type {
    pub fn bool_ty() -> Type {
        Type::Arithmetic {
            signedness: Signedness::Unsigned,
            width: 1,
            is_bool: true,
        }
    }

    pub fn char_ty() -> Type {
        Type::Arithmetic {
            signedness: Signedness::Signed,
            width: 1,
            is_bool: false,
        }
    }

    pub fn uchar() -> Type {
        Type::Arithmetic {
            signedness: Signedness::Unsigned,
            width: 1,
            is_bool: false,
        }
    }

    pub fn short() -> Type {
        Type::Arithmetic {
            signedness: Signedness::Signed,
            width: 2,
            is_bool: false,
        }
    }

    pub fn int() -> Type {
        Type::Arithmetic {
            signedness: Signedness::Signed,
            width: 4,
            is_bool: false,
        }
    }

    pub fn uint() -> Type {
        Type::Arithmetic {
            signedness: Signedness::Unsigned,
            width: 4,
            is_bool: false,
        }
    }

    pub fn long() -> Type {
        Type::Arithmetic {
            signedness: Signedness::Signed,
            width: 8,
            is_bool: false,
        }
    }

    pub fn ulong() -> Type {
        Type::Arithmetic {
            signedness: Signedness::Unsigned,
            width: 8,
            is_bool: false,
        }
    }

    pub fn pointer_to(pointee: Type) -> Type {
        Type::Pointer(Rc::new(pointee))
    }

    pub fn poison() -> Type {
        Type::Poison
    }

    pub fn is_poison(&self) -> bool {
        matches!(self, Type::Poison)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(self, Type::Arithmetic { .. } | Type::Poison)
    }

    pub fn is_integer(&self) -> bool {
        self.is_arithmetic()
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Type::Function { .. })
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Type::Aggregate(_))
    }

    pub fn is_scalar(&self) -> bool {
        self.is_arithmetic() || self.is_pointer()
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            Type::Arithmetic {
                signedness: Signedness::Unsigned,
                ..
            }
        )
    }

    pub fn width(&self) -> Option<u8> {
        match self {
            Type::Arithmetic { width, .. } => Some(*width),
            Type::Poison => Some(4),
            _ => None,
        }
    }

    /// Array-to-pointer decay, applied everywhere an lvalue of array
    /// type is used except as the operand of `sizeof`/unary `&`.
    pub fn decay(&self) -> Type {
        match self {
            Type::Array { element, .. } => Type::Pointer(element.clone()),
            Type::Function { .. } => Type::Pointer(Rc::new(self.clone())),
            other => other.clone(),
        }
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer(p) => Some(p),
            _ => None,
        }
    }

    /// Whether this type is "complete": has a defined size. Incomplete
    /// arrays, incomplete aggregates, `void`, and function types are not.
    pub fn is_complete(&self) -> bool {
        match self {
            Type::Void => false,
            Type::Function { .. } => false,
            Type::Array { length, .. } => length.is_some(),
            Type::Aggregate(def) => def.members.is_some(),
            _ => true,
        }
    }

    /// Size in bytes of a complete type. Panics (a compiler-internal
    /// bug, not a user error) if called on an incomplete type; callers
    /// must check `is_complete()` first and raise a diagnostic instead.
    pub fn size(&self) -> usize {
        match self {
            Type::Arithmetic { width, .. } => *width as usize,
            Type::Pointer(_) => 8,
            Type::Array { element, length } => {
                element.size() * length.expect("size() on incomplete array")
            }
            Type::Aggregate(def) => {
                let members = def.members.as_ref().expect("size() on incomplete aggregate");
                match def.kind {
                    AggKind::Union => {
                        let max_size = members.iter().map(|m| m.ty.size()).max().unwrap_or(0);
                        round_up(max_size, self.align())
                    }
                    AggKind::Struct => {
                        let end = members.last().map(|m| m.offset + m.ty.size()).unwrap_or(0);
                        round_up(end, self.align())
                    }
                }
            }
            Type::Poison => 4,
            Type::Void | Type::Function { .. } => {
                panic!("size() on a type with no size")
            }
        }
    }

    /// Alignment in bytes of a complete type.
    pub fn align(&self) -> usize {
        match self {
            Type::Arithmetic { width, .. } => *width as usize,
            Type::Pointer(_) => 8,
            Type::Array { element, .. } => element.align(),
            Type::Aggregate(def) => {
                let members = def.members.as_ref().expect("align() on incomplete aggregate");
                members.iter().map(|m| m.ty.align()).max().unwrap_or(1)
            }
            Type::Poison => 4,
            Type::Void | Type::Function { .. } => 1,
        }
    }
}

fn round_up(value: usize, align: usize) -> usize {
    if align == 0 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

/// Compute struct/union member layout: each member padded to its own
/// alignment, struct total size rounded to the struct's own alignment
/// (the max of its members'). Unions start every member at offset 0.
pub fn layout_members(kind: AggKind, fields: &[(String, Type)]) -> Vec<Member> {
    let mut offset = 0usize;
    let mut members = Vec::with_capacity(fields.len());
    for (name, ty) in fields {
        let member_offset = match kind {
            AggKind::Union => 0,
            AggKind::Struct => {
                let a = ty.align();
                round_up(offset, a)
            }
        };
        members.push(Member {
            name: name.clone(),
            ty: ty.clone(),
            offset: member_offset,
        });
        if kind == AggKind::Struct {
            offset = member_offset + ty.size();
        }
    }
    members
}

/// Integer conversion rank used by promotion/usual-arithmetic-conversion
/// rules: our fixed width set makes rank equal to width.
fn rank(t: &Type) -> u8 {
    match t {
        Type::Arithmetic { width, .. } => *width,
        Type::Poison => 4,
        _ => 0,
    }
}

/// Integer promotion (§4.1): anything narrower than `int` becomes
/// `int` (with our fixed widths `int` always fits an `unsigned short`
/// or `unsigned char`'s range, so the "or unsigned int" branch of the
/// rule never triggers here).
pub fn promote(t: &Type) -> Type {
    match t {
        Type::Arithmetic { width, .. } if *width < 4 => Type::int(),
        Type::Poison => Type::Poison,
        other => other.clone(),
    }
}

/// Usual arithmetic conversions (§4.1), applied to the *promoted*
/// operand types of a binary arithmetic/comparison operator.
pub fn usual_arithmetic_conversions(a: &Type, b: &Type) -> Type {
    let a = promote(a);
    let b = promote(b);
    if a.is_poison() || b.is_poison() {
        return Type::Poison;
    }
    let (ra, rb) = (rank(&a), rank(&b));
    let a_unsigned = a.is_unsigned();
    let b_unsigned = b.is_unsigned();

    // (1) either is unsigned long -> both unsigned long
    if (ra == 8 && a_unsigned) || (rb == 8 && b_unsigned) {
        return Type::ulong();
    }
    // (2) one is long, other unsigned int, same rank -> unsigned long.
    // Not reachable with our fixed widths (long has rank 8, unsigned
    // int has rank 4) but kept to mirror the spec's ladder faithfully.
    if (ra == 8 && !a_unsigned && rb == 8 && b_unsigned)
        || (rb == 8 && !b_unsigned && ra == 8 && a_unsigned)
    {
        return Type::ulong();
    }
    // (3) one is long -> both long
    if (ra == 8 && !a_unsigned) || (rb == 8 && !b_unsigned) {
        return Type::long();
    }
    // (4) either is unsigned int -> both unsigned int
    if a_unsigned || b_unsigned {
        return Type::uint();
    }
    // (5) otherwise both int
    Type::int()
}

/// Classification of an implicit conversion from one type to another,
/// deciding whether a lowering site needs an explicit `SET` conversion
/// command, is fine as-is, warrants a warning, or must be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    Identity,
    IntegerPromotion,
    UsualArithmetic,
    PointerToVoid,
    NullPointerConstant,
    IncompatiblePointerWarning,
    Forbidden,
}

/// Classify the implicit conversion needed to use a value of type
/// `from` where `to` is expected (e.g. assignment, argument passing).
pub fn classify_conversion(from: &Type, to: &Type, const_value: Option<i64>) -> Conversion {
    if from.is_poison() || to.is_poison() {
        return Conversion::Identity;
    }
    if compatible(from, to) {
        return Conversion::Identity;
    }
    match (from, to) {
        (Type::Arithmetic { .. }, Type::Arithmetic { .. }) => Conversion::UsualArithmetic,
        (Type::Pointer(_), Type::Pointer(p)) if p.is_void() => Conversion::PointerToVoid,
        (Type::Pointer(p), Type::Pointer(_)) if p.is_void() => Conversion::PointerToVoid,
        _ if is_null_pointer_constant(from, const_value) && to.is_pointer() => {
            Conversion::NullPointerConstant
        }
        (Type::Pointer(_), Type::Pointer(_)) => Conversion::IncompatiblePointerWarning,
        _ => Conversion::Forbidden,
    }
}

/// Is a value of type `ty` (with the given folded constant, if any) a
/// null pointer constant: an integer constant expression with value 0,
/// or such a constant cast to `void*`.
pub fn is_null_pointer_constant(ty: &Type, const_value: Option<i64>) -> bool {
    match ty {
        Type::Arithmetic { .. } => const_value == Some(0),
        Type::Pointer(pointee) => pointee.is_void() && const_value == Some(0),
        _ => false,
    }
}

/// Two types are compatible (§3 invariants): structurally identical up
/// to array completeness, function prototype looseness, and tag
/// identity for aggregates. Qualifiers participate only for pointers.
pub fn compatible(a: &Type, b: &Type) -> bool {
    match (a, b) {
        (Type::Poison, _) | (_, Type::Poison) => true,
        (Type::Void, Type::Void) => true,
        (
            Type::Arithmetic {
                signedness: sa,
                width: wa,
                is_bool: ba,
            },
            Type::Arithmetic {
                signedness: sb,
                width: wb,
                is_bool: bb,
            },
        ) => sa == sb && wa == wb && ba == bb,
        (Type::Pointer(pa), Type::Pointer(pb)) => compatible(pa, pb),
        (
            Type::Array {
                element: ea,
                length: la,
            },
            Type::Array {
                element: eb,
                length: lb,
            },
        ) => compatible(ea, eb) && (la.is_none() || lb.is_none() || la == lb),
        (
            Type::Function {
                ret: ra,
                params: pa,
            },
            Type::Function {
                ret: rb,
                params: pb,
            },
        ) => {
            if !compatible(ra, rb) {
                return false;
            }
            match (pa, pb) {
                (None, _) | (_, None) => true,
                (Some(pa), Some(pb)) => {
                    pa.len() == pb.len() && pa.iter().zip(pb).all(|(x, y)| compatible(x, y))
                }
            }
        }
        (Type::Aggregate(da), Type::Aggregate(db)) => da.tag_id == db.tag_id,
        _ => false,
    }
}

/// The composite type formed by merging two compatible declarations:
/// an incomplete array/aggregate gains the other's completion, an
/// unprototyped function gains the other's prototype.
pub fn compose(a: &Type, b: &Type) -> Type {
    match (a, b) {
        (Type::Array { element, length }, Type::Array { length: lb, .. }) => Type::Array {
            element: element.clone(),
            length: length.or(*lb),
        },
        (Type::Function { ret, params }, Type::Function { params: pb, .. }) => Type::Function {
            ret: ret.clone(),
            params: params.clone().or_else(|| pb.clone()),
        },
        _ => a.clone(),
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Poison => write!(f, "<poison>"),
            Type::Arithmetic {
                signedness,
                width,
                is_bool,
            } => {
                if *is_bool {
                    return write!(f, "_Bool");
                }
                let name = match width {
                    1 => "char",
                    2 => "short",
                    4 => "int",
                    8 => "long",
                    _ => "int",
                };
                if *signedness == Signedness::Unsigned {
                    write!(f, "unsigned {}", name)
                } else {
                    write!(f, "{}", name)
                }
            }
            Type::Pointer(p) => write!(f, "{}*", p),
            Type::Array { element, length } => match length {
                Some(n) => write!(f, "{}[{}]", element, n),
                None => write!(f, "{}[]", element),
            },
            Type::Function { ret, params } => {
                write!(f, "{} (", ret)?;
                match params {
                    None => write!(f, "/* unspecified */")?,
                    Some(ps) if ps.is_empty() => write!(f, "void")?,
                    Some(ps) => {
                        for (i, p) in ps.iter().enumerate() {
                            if i > 0 {
                                write!(f, ", ")?;
                            }
                            write!(f, "{}", p)?;
                        }
                    }
                }
                write!(f, ")")
            }
            Type::Aggregate(def) => {
                let kw = match def.kind {
                    AggKind::Struct => "struct",
                    AggKind::Union => "union",
                };
                match &def.tag {
                    Some(t) => write!(f, "{} {}", kw, t),
                    None => write!(f, "{} <anonymous>", kw),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizeof_basic_widths() {
        assert_eq!(Type::bool_ty().size(), 1);
        assert_eq!(Type::char_ty().size(), 1);
        assert_eq!(Type::short().size(), 2);
        assert_eq!(Type::int().size(), 4);
        assert_eq!(Type::long().size(), 8);
        assert_eq!(Type::pointer_to(Type::int()).size(), 8);
    }

    #[test]
    fn sizeof_array_is_n_times_element() {
        let arr = Type::Array {
            element: Rc::new(Type::int()),
            length: Some(5),
        };
        assert_eq!(arr.size(), 20);
    }

    #[test]
    fn struct_padding_and_total_alignment() {
        // struct { char c; int i; struct { char a; long b; } nested; }
        let inner = Type::Aggregate(Rc::new(AggDef {
            kind: AggKind::Struct,
            tag: None,
            tag_id: 1,
            members: Some(Rc::new(layout_members(
                AggKind::Struct,
                &[("a".into(), Type::char_ty()), ("b".into(), Type::long())],
            ))),
        }));
        assert_eq!(inner.size(), 16); // char + 7 pad + long
        assert_eq!(inner.align(), 8);

        let outer_fields = vec![
            ("c".to_string(), Type::char_ty()),
            ("i".to_string(), Type::int()),
            ("nested".to_string(), inner),
        ];
        let members = layout_members(AggKind::Struct, &outer_fields);
        let outer = Type::Aggregate(Rc::new(AggDef {
            kind: AggKind::Struct,
            tag: None,
            tag_id: 2,
            members: Some(Rc::new(members)),
        }));
        assert_eq!(outer.size(), 32);
    }

    #[test]
    fn compatibility_is_reflexive_and_symmetric() {
        let a = Type::pointer_to(Type::int());
        let b = Type::pointer_to(Type::int());
        assert!(compatible(&a, &a));
        assert!(compatible(&a, &b));
        assert!(compatible(&b, &a));
    }

    #[test]
    fn incomplete_array_compatible_with_complete() {
        let incomplete = Type::Array {
            element: Rc::new(Type::int()),
            length: None,
        };
        let complete = Type::Array {
            element: Rc::new(Type::int()),
            length: Some(10),
        };
        assert!(compatible(&incomplete, &complete));
        let composed = compose(&incomplete, &complete);
        assert_eq!(composed.size(), 40);
    }

    #[test]
    fn usual_arithmetic_conversions_ladder() {
        assert_eq!(
            usual_arithmetic_conversions(&Type::int(), &Type::uint()),
            Type::uint()
        );
        assert_eq!(
            usual_arithmetic_conversions(&Type::long(), &Type::int()),
            Type::long()
        );
        assert_eq!(
            usual_arithmetic_conversions(&Type::char_ty(), &Type::short()),
            Type::int()
        );
        assert_eq!(
            usual_arithmetic_conversions(&Type::ulong(), &Type::long()),
            Type::ulong()
        );
    }

    #[test]
    fn null_pointer_constant_rules() {
        assert!(is_null_pointer_constant(&Type::int(), Some(0)));
        assert!(!is_null_pointer_constant(&Type::int(), Some(1)));
        assert!(is_null_pointer_constant(
            &Type::pointer_to(Type::Void),
            Some(0)
        ));
    }
}
