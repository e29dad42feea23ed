//! Field and method descriptor parsing (`I`, `Ljava/lang/String;`, `(IJ)Z`, ...).

use crate::types::ValueKind;

/// Parses a single field descriptor. Returns `None` on malformed input or
/// trailing characters.
pub fn parse_field_descriptor(descriptor: &str) -> Option<ValueKind> {
    let (kind, rest) = parse_one(descriptor)?;
    if rest.is_empty() {
        Some(kind)
    } else {
        None
    }
}

/// Parses a method descriptor into (parameter kinds, return kind).
pub fn parse_method_descriptor(descriptor: &str) -> Option<(Vec<ValueKind>, ValueKind)> {
    let mut rest = descriptor.strip_prefix('(')?;
    let mut params = Vec::new();
    while !rest.starts_with(')') {
        let (kind, tail) = parse_one(rest)?;
        params.push(kind);
        rest = tail;
    }
    let ret = &rest[1..];
    let ret = if ret == "V" { ValueKind::Void } else { parse_field_descriptor(ret)? };
    Some((params, ret))
}

fn parse_one(s: &str) -> Option<(ValueKind, &str)> {
    let mut chars = s.chars();
    let kind = match chars.next()? {
        // byte, char and short are int-typed on the operand stack
        'B' | 'C' | 'S' | 'I' => ValueKind::Int,
        'Z' => ValueKind::Bool,
        'J' => ValueKind::Long,
        'F' => ValueKind::Float,
        'D' => ValueKind::Double,
        'L' => {
            let end = s.find(';')?;
            let class = &s[1..end];
            if class.is_empty() {
                return None;
            }
            return Some((class_kind(class), &s[end + 1..]));
        }
        '[' => {
            let (elem, rest) = parse_one(&s[1..])?;
            return Some((ValueKind::Array(Box::new(elem)), rest));
        }
        _ => return None,
    };
    Some((kind, chars.as_str()))
}

/// Maps an internal class name to the kind the analyzer tracks for it.
pub fn class_kind(internal_name: &str) -> ValueKind {
    match internal_name {
        "java/lang/String" => ValueKind::Str,
        other => ValueKind::Object(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_primitive_descriptors() {
        assert_eq!(parse_field_descriptor("I"), Some(ValueKind::Int));
        assert_eq!(parse_field_descriptor("Z"), Some(ValueKind::Bool));
        assert_eq!(parse_field_descriptor("J"), Some(ValueKind::Long));
        assert_eq!(parse_field_descriptor("C"), Some(ValueKind::Int));
        assert_eq!(parse_field_descriptor("II"), None);
        assert_eq!(parse_field_descriptor("X"), None);
    }

    #[test]
    fn test_parse_reference_and_array_descriptors() {
        assert_eq!(parse_field_descriptor("Ljava/lang/String;"), Some(ValueKind::Str));
        assert_eq!(
            parse_field_descriptor("Lcom/acme/Person;"),
            Some(ValueKind::Object("com/acme/Person".into()))
        );
        assert_eq!(
            parse_field_descriptor("[[D"),
            Some(ValueKind::Array(Box::new(ValueKind::Array(Box::new(ValueKind::Double)))))
        );
        assert_eq!(parse_field_descriptor("L;"), None);
        assert_eq!(parse_field_descriptor("Ljava/lang/String"), None);
    }

    #[test]
    fn test_parse_method_descriptor() {
        let (params, ret) = parse_method_descriptor("(ILjava/lang/Object;[J)Z").unwrap();
        assert_eq!(
            params,
            vec![
                ValueKind::Int,
                ValueKind::Object("java/lang/Object".into()),
                ValueKind::Array(Box::new(ValueKind::Long)),
            ]
        );
        assert_eq!(ret, ValueKind::Bool);
        assert_eq!(parse_method_descriptor("()V"), Some((vec![], ValueKind::Void)));
        assert_eq!(parse_method_descriptor("I)V"), None);
        assert_eq!(parse_method_descriptor("(I"), None);
    }
}
