//! Intrinsics module: library methods with a known meaning inside predicates.
//!
//! The decoder consults the registry to turn boxing/unboxing calls into
//! dedicated opcodes; the simulator consults it to lower equality methods to
//! comparisons. Unknown methods are left as plain invocations.

use crate::constant_pool::MemberRef;
use crate::types::ValueKind;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intrinsic {
    /// Wrap a primitive into its wrapper object; transparent to analysis.
    Box(ValueKind),
    /// Unwrap a wrapper object; transparent to analysis.
    Unbox(ValueKind),
    /// `a.equals(b)` or `Objects.equals(a, b)`: value equality of two operands.
    Equals,
}

/// Lookup key: owner `None` matches any receiver class.
type Key = (Option<String>, String, String);

#[derive(Debug, Clone, Default)]
pub struct IntrinsicRegistry {
    intrinsics: HashMap<Key, Intrinsic>,
}

impl IntrinsicRegistry {
    pub fn new() -> Self {
        Self { intrinsics: HashMap::new() }
    }

    /// Registry pre-populated with the standard library intrinsics.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        register_builtins(&mut reg);
        reg
    }

    pub fn register(
        &mut self,
        owner: Option<&str>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        intrinsic: Intrinsic,
    ) {
        self.intrinsics
            .insert((owner.map(str::to_string), name.into(), descriptor.into()), intrinsic);
    }

    /// Exact owner match first, then an owner-agnostic entry.
    pub fn get(&self, method: &MemberRef) -> Option<&Intrinsic> {
        let exact = (Some(method.owner.clone()), method.name.clone(), method.descriptor.clone());
        self.intrinsics.get(&exact).or_else(|| {
            self.intrinsics
                .get(&(None, method.name.clone(), method.descriptor.clone()))
        })
    }

    pub fn len(&self) -> usize {
        self.intrinsics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intrinsics.is_empty()
    }
}

macro_rules! builtin_intrinsics {
    ($( $owner:expr, $name:expr, $desc:expr => $intrinsic:expr ),* $(,)?) => {
        pub fn register_builtins(reg: &mut IntrinsicRegistry) {
            $(reg.register($owner, $name, $desc, $intrinsic);)*
        }
    };
}

builtin_intrinsics! {
    Some("java/lang/Integer"), "valueOf", "(I)Ljava/lang/Integer;" => Intrinsic::Box(ValueKind::Int),
    Some("java/lang/Long"), "valueOf", "(J)Ljava/lang/Long;" => Intrinsic::Box(ValueKind::Long),
    Some("java/lang/Float"), "valueOf", "(F)Ljava/lang/Float;" => Intrinsic::Box(ValueKind::Float),
    Some("java/lang/Double"), "valueOf", "(D)Ljava/lang/Double;" => Intrinsic::Box(ValueKind::Double),
    Some("java/lang/Boolean"), "valueOf", "(Z)Ljava/lang/Boolean;" => Intrinsic::Box(ValueKind::Bool),
    Some("java/lang/Integer"), "intValue", "()I" => Intrinsic::Unbox(ValueKind::Int),
    Some("java/lang/Long"), "longValue", "()J" => Intrinsic::Unbox(ValueKind::Long),
    Some("java/lang/Float"), "floatValue", "()F" => Intrinsic::Unbox(ValueKind::Float),
    Some("java/lang/Double"), "doubleValue", "()D" => Intrinsic::Unbox(ValueKind::Double),
    Some("java/lang/Boolean"), "booleanValue", "()Z" => Intrinsic::Unbox(ValueKind::Bool),
    Some("java/util/Objects"), "equals", "(Ljava/lang/Object;Ljava/lang/Object;)Z" => Intrinsic::Equals,
    None, "equals", "(Ljava/lang/Object;)Z" => Intrinsic::Equals,
}
