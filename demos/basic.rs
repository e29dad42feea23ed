use lambdaquery::*;

fn main() -> Result<(), AnalysisError> {
    // 1. Constant pool as resolved by the class loader
    let pool = ConstantPool::new()
        .with(Constant::FieldRef(MemberRef::new("com/acme/Person", "age", "I")))
        .with(Constant::FieldRef(MemberRef::new("com/acme/Person", "name", "Ljava/lang/String;")));

    // 2. Body of `p -> p.age >= 18 && p.name != null`
    let code = vec![
        0x2a, 0xb4, 0x00, 0x01, 0x10, 18, 0xa1, 0x00, 0x0e, // age < 18 -> false
        0x2a, 0xb4, 0x00, 0x02, 0xc6, 0x00, 0x07, // name == null -> false
        0x04, 0xa7, 0x00, 0x04, // true
        0x03, // false
        0xac,
    ];

    let subject = SubjectTypeBuilder::new("com/acme/Person")
        .field("age", ValueKind::Int)
        .field("name", ValueKind::Str)
        .build();
    let source = RawPredicate::new("com/acme/Queries$$Lambda$1", code, pool, SubjectParam::first(subject));

    // 3. Analyze
    let analyzer = Analyzer::default();
    let result = analyzer.analyze(&source)?;
    println!("Expression: {}", result.expression);
    println!("Tree: {:#?}", result.expression);

    // 4. Walk the referenced properties
    for path in result.expression.argument_paths() {
        println!("references {}", path.dotted().unwrap_or_else(|| path.to_string()));
    }

    // 5. A second call is served from the cache
    analyzer.analyze(&source)?;
    println!("Cache: {:?}", analyzer.stats());
    Ok(())
}
