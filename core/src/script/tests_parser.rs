use super::ast::*;
use super::*;

fn parse(source: &str) -> Program {
    parse_program(source).unwrap()
}

fn syntax_error(source: &str) -> (String, usize) {
    match parse_program(source) {
        Err(ScriptError::Syntax { message, line, .. }) => (message, line),
        other => panic!("expected a syntax error, got {:?}", other),
    }
}

#[test]
fn test_declarations_and_return() {
    let program = parse("const PARAMS = { width: 10, overlap: 0.01 };\nlet a = 1, b;\nreturn a;");
    assert_eq!(program.body.len(), 3);
    match &program.body[1] {
        Stmt::VarDecl { kind, declarations } => {
            assert_eq!(*kind, DeclKind::Let);
            assert_eq!(declarations.len(), 2);
            assert_eq!(declarations[1], ("b".to_string(), None));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(program.body[2], Stmt::Return(Some(Expr::Ident("a".into()))));
}

#[test]
fn test_operator_precedence() {
    let program = parse("return 1 + 2 * 3 ** 2;");
    let expected = Expr::Binary {
        op: BinaryOperator::Add,
        left: Box::new(Expr::Number(1.0)),
        right: Box::new(Expr::Binary {
            op: BinaryOperator::Mul,
            left: Box::new(Expr::Number(2.0)),
            right: Box::new(Expr::Binary {
                op: BinaryOperator::Pow,
                left: Box::new(Expr::Number(3.0)),
                right: Box::new(Expr::Number(2.0)),
            }),
        }),
    };
    assert_eq!(program.body[0], Stmt::Return(Some(expected)));
}

#[test]
fn test_arrow_functions() {
    let program = parse("const f = x => x * 2;\nconst g = (a, b = 3) => { return a + b; };\nconst h = () => 1;");
    for stmt in &program.body {
        let Stmt::VarDecl { declarations, .. } = stmt else {
            panic!("expected declaration");
        };
        assert!(matches!(declarations[0].1, Some(Expr::Function(_))));
    }
    let Stmt::VarDecl { declarations, .. } = &program.body[1] else {
        unreachable!()
    };
    let Some(Expr::Function(def)) = &declarations[0].1 else {
        unreachable!()
    };
    assert_eq!(def.params.len(), 2);
    assert!(def.params[1].default.is_some());
    assert!(matches!(def.body, FunctionBody::Block(_)));
}

#[test]
fn test_parenthesized_expression_is_not_an_arrow() {
    let program = parse("return (1 + 2) * 3;");
    assert!(matches!(
        program.body[0],
        Stmt::Return(Some(Expr::Binary {
            op: BinaryOperator::Mul,
            ..
        }))
    ));
}

#[test]
fn test_object_literals() {
    let program = parse("return [{ solid, color: 'red', \"name\": `part ${1 + 1}` }, { ...base }];");
    let Stmt::Return(Some(Expr::Array(elements))) = &program.body[0] else {
        panic!("expected array");
    };
    let Element::Item(Expr::Object(props)) = &elements[0] else {
        panic!("expected object");
    };
    assert_eq!(props[0], Property::Pair("solid".into(), Expr::Ident("solid".into())));
    assert_eq!(props[1], Property::Pair("color".into(), Expr::Str("red".into())));
    assert!(matches!(&props[2], Property::Pair(key, Expr::Template(_)) if key == "name"));
    let Element::Item(Expr::Object(spread)) = &elements[1] else {
        panic!("expected object");
    };
    assert!(matches!(spread[0], Property::Spread(_)));
}

#[test]
fn test_semicolons_are_optional_across_lines() {
    let program = parse("const a = 1\nconst b = 2\nreturn a + b");
    assert_eq!(program.body.len(), 3);
}

#[test]
fn test_return_on_its_own_line_returns_nothing() {
    let program = parse("return\n42");
    assert_eq!(program.body[0], Stmt::Return(None));
    assert_eq!(program.body[1], Stmt::Expr(Expr::Number(42.0)));
}

#[test]
fn test_loops() {
    let program = parse(
        "for (let i = 0; i < 4; i++) { if (i == 2) continue; }\n\
         for (const hole of holes) { break; }\n\
         while (n > 0) n--;",
    );
    assert!(matches!(program.body[0], Stmt::For { .. }));
    assert!(matches!(&program.body[1], Stmt::ForOf { name, .. } if name == "hole"));
    assert!(matches!(program.body[2], Stmt::While { .. }));
}

#[test]
fn test_syntax_error_reports_line() {
    let (message, line) = syntax_error("const a = 1;\nconst b = ;");
    assert_eq!(line, 2);
    assert!(message.starts_with("Unexpected token"), "{}", message);
}

#[test]
fn test_same_line_statements_need_a_semicolon() {
    let (message, _) = syntax_error("const a = 1 const b = 2");
    assert_eq!(message, "Unexpected token 'const'");
}

#[test]
fn test_module_syntax_is_rejected() {
    let (message, _) = syntax_error("import fs from 'fs';");
    assert!(message.contains("import"));
    syntax_error("export default 1;");
}

#[test]
fn test_illegal_statements() {
    assert_eq!(syntax_error("break;").0, "Illegal break statement");
    assert_eq!(
        syntax_error("for (;;) { const f = () => { continue; }; }").0,
        "Illegal continue statement: no surrounding iteration statement"
    );
    assert_eq!(syntax_error("const x;").0, "Missing initializer in const declaration");
    assert_eq!(syntax_error("1 = 2;").0, "Invalid left-hand side in assignment");
    assert!(syntax_error("class A {}").0.contains("not supported"));
}

#[test]
fn test_unterminated_input() {
    let (message, _) = syntax_error("function f() { return 1;");
    assert_eq!(message, "Unexpected end of input");
}

#[test]
fn test_syntax_error_display() {
    let err = parse_program("return )").unwrap_err();
    let text = err.to_string();
    assert!(text.starts_with("SyntaxError: Unexpected token"));
    assert!(text.contains("at line 1, column"));
}

#[test]
fn test_nesting_limit() {
    let source = format!("return {}1{};", "(".repeat(2_000), ")".repeat(2_000));
    let (message, line) = syntax_error(&source);
    assert_eq!(message, format!("Script is nested more than {} levels deep", parser::MAX_NESTING));
    assert_eq!(line, 1);

    let chain = format!("return 1{};", " + 1".repeat(1_000));
    assert!(syntax_error(&chain).0.contains("nested more than"));
    let arrays = format!("return {}{};", "[".repeat(1_000), "]".repeat(1_000));
    assert!(syntax_error(&arrays).0.contains("nested more than"));

    parse(&format!("return {}1{};", "(".repeat(20), ")".repeat(20)));
}
