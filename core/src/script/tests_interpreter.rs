use std::sync::Arc;

use super::*;
use crate::kernel::PolygonKernel;

fn run_with(source: &str, limits: ScriptLimits) -> ScriptResult<Value> {
    interpreter::run_script(source, Arc::new(PolygonKernel::new()), limits)
}

fn run(source: &str) -> ScriptResult<Value> {
    run_with(source, ScriptLimits::default())
}

fn number(source: &str) -> f64 {
    match run(source) {
        Ok(Value::Number(n)) => n,
        other => panic!("expected a number, got {:?}", other),
    }
}

fn text(source: &str) -> String {
    match run(source) {
        Ok(Value::Str(s)) => s.to_string(),
        other => panic!("expected a string, got {:?}", other),
    }
}

fn error(source: &str) -> String {
    run(source).unwrap_err().to_string()
}

/// Run on a thread sized like the sandbox's, for scripts that recurse deeply.
fn error_on_script_stack(source: String, limits: ScriptLimits) -> ScriptError {
    std::thread::Builder::new()
        .stack_size(crate::sandbox::SCRIPT_STACK_SIZE)
        .spawn(move || run_with(&source, limits).unwrap_err())
        .unwrap()
        .join()
        .unwrap()
}

fn small_heap() -> ScriptLimits {
    ScriptLimits {
        max_heap_bytes: 1024 * 1024,
        ..ScriptLimits::default()
    }
}

#[test]
fn test_arithmetic() {
    assert_eq!(number("return 1 + 2 * 3 ** 2;"), 19.0);
    assert_eq!(number("return (7 % 4) - -1;"), 4.0);
    assert_eq!(number("let x = 10; x += 5; x *= 2; x -= 1; x /= 29; return x;"), 1.0);
    assert_eq!(number("let i = 1; const a = i++; const b = ++i; return a * 10 + b;"), 13.0);
}

#[test]
fn test_strings_and_templates() {
    assert_eq!(text("const w = 10; return `w=${w}mm`;"), "w=10mm");
    assert_eq!(text("return 'part-' + 1.5;"), "part-1.5");
    assert_eq!(text("return typeof cuboid;"), "function");
    assert_eq!(text("return typeof notDeclared;"), "undefined");
    assert_eq!(number("return 'bracket'.length;"), 7.0);
}

#[test]
fn test_equality() {
    assert!(matches!(run("return 1 == '1';"), Ok(Value::Bool(true))));
    assert!(matches!(run("return 1 === '1';"), Ok(Value::Bool(false))));
    assert!(matches!(run("return null == undefined;"), Ok(Value::Bool(true))));
    assert!(matches!(run("const a = []; return a === a;"), Ok(Value::Bool(true))));
    assert!(matches!(run("return undefined ?? 4;"), Ok(Value::Number(n)) if n == 4.0));
}

#[test]
fn test_functions_and_closures() {
    let source = "
        function factorial(n) { return n <= 1 ? 1 : n * factorial(n - 1); }
        const adder = (k) => (x) => x + k;
        const add3 = adder(3);
        return factorial(5) + add3(1);
    ";
    assert_eq!(number(source), 124.0);
}

#[test]
fn test_function_declarations_are_hoisted() {
    assert_eq!(number("return twice(4);\nfunction twice(x) { return x * 2; }"), 8.0);
}

#[test]
fn test_default_parameters() {
    assert_eq!(number("function f(a, b = a * 2) { return a + b; } return f(3);"), 9.0);
}

#[test]
fn test_loops() {
    let source = "
        let total = 0;
        for (let i = 0; i < 10; i++) {
            if (i % 2 == 0) continue;
            if (i > 7) break;
            total += i;
        }
        for (const v of [100, 200]) total += v;
        let n = 3;
        while (n > 0) { total += 1000; n--; }
        return total;
    ";
    assert_eq!(number(source), 1 as f64 + 3.0 + 5.0 + 7.0 + 300.0 + 3000.0);
}

#[test]
fn test_array_methods() {
    assert_eq!(
        text("return [1, 2, 3, 4].map(x => x * 2).filter(x => x > 2).join('-');"),
        "4-6-8"
    );
    assert_eq!(number("return [1, 2, 3].reduce((a, b) => a + b, 10);"), 16.0);
    assert_eq!(number("const a = [1]; a.push(2, 3); return a.length;"), 3.0);
    assert_eq!(text("return [1, 2].concat([3], 4).slice(-3).join();"), "2,3,4");
    assert_eq!(number("let s = 0; [1, 2, 3].forEach((v, i) => { s += v * i; }); return s;"), 8.0);
    assert_eq!(number("const a = [...[1, 2], 3]; a[5] = 6; return a.length;"), 6.0);
    assert_eq!(
        error("return [].reduce((a, b) => a + b);"),
        "TypeError: Reduce of empty array with no initial value"
    );
}

#[test]
fn test_objects() {
    let source = "
        const PARAMS = { width: 40, height: 20 };
        const more = { ...PARAMS, depth: 5 };
        more.width = 50;
        more['height'] += 1;
        return more.width + more.height + more.depth + PARAMS.width;
    ";
    assert_eq!(number(source), 50.0 + 21.0 + 5.0 + 40.0);
}

#[test]
fn test_math() {
    assert!((number("return Math.sin(Math.PI / 2);") - 1.0).abs() < 1e-12);
    assert_eq!(number("return Math.max(1, 7, 3) + Math.min(4, 2);"), 9.0);
    assert_eq!(number("return Math.round(2.5) + Math.floor(-1.5) + Math.sign(-3);"), 3.0 - 2.0 - 1.0);
    assert_eq!(number("return Math.hypot(3, 4);"), 5.0);
    assert_eq!(error("return Math.random();"), "TypeError: Math.random is not a function");
}

#[test]
fn test_const_cannot_be_reassigned() {
    assert_eq!(
        error("const a = 1; a = 2;"),
        "TypeError: Assignment to constant variable."
    );
}

#[test]
fn test_unknown_names_are_reference_errors() {
    assert_eq!(error("return foo + 1;"), "ReferenceError: foo is not defined");
    assert_eq!(error("require('fs');"), "ReferenceError: require is not defined");
    assert_eq!(error("console.log(1);"), "ReferenceError: console is not defined");
    assert_eq!(error("return globalThis;"), "ReferenceError: globalThis is not defined");
    assert_eq!(error("eval('1');"), "ReferenceError: eval is not defined");
}

#[test]
fn test_primitive_names_cannot_be_redeclared() {
    assert_eq!(
        error("const sphere = 1;"),
        "SyntaxError: Identifier 'sphere' has already been declared"
    );
}

#[test]
fn test_calling_a_non_function() {
    assert_eq!(error("const a = 1; a();"), "TypeError: a is not a function");
    assert_eq!(error("const o = {}; o.build();"), "TypeError: o.build is not a function");
}

#[test]
fn test_property_of_undefined() {
    assert_eq!(
        error("const o = {}; return o.missing.x;"),
        "TypeError: Cannot read properties of undefined (reading 'x')"
    );
}

#[test]
fn test_solids_are_opaque() {
    let err = error("const b = cuboid({ size: [1, 1, 1] }); return b.polygons;");
    assert!(err.starts_with("TypeError: Cannot access property 'polygons' of a solid"), "{}", err);

    let err = error("const b = cuboid(); b.x = 1;");
    assert!(err.starts_with("TypeError:"), "{}", err);

    let err = error("return cuboid() + cuboid();");
    assert!(err.contains("combine solids with union"), "{}", err);
}

#[test]
fn test_step_budget() {
    let limits = ScriptLimits {
        max_steps: 10_000,
        ..ScriptLimits::default()
    };
    let err = run_with("while (true) {}", limits).unwrap_err();
    assert!(matches!(err, ScriptError::Budget(_)));
    assert!(err.to_string().contains("10000 evaluation steps"));
}

#[test]
fn test_call_depth_budget() {
    let err = error_on_script_stack(
        "function f(n) { return f(n + 1); } return f(0);".into(),
        ScriptLimits::default(),
    );
    assert_eq!(err.to_string(), "RangeError: Maximum call stack size exceeded");
}

#[test]
fn test_expression_nesting_budget() {
    let limits = ScriptLimits {
        max_nesting: 20,
        ..ScriptLimits::default()
    };
    let source = format!("return {}1{};", "1 + (".repeat(30), ")".repeat(30));
    let err = run_with(&source, limits).unwrap_err();
    assert!(matches!(err, ScriptError::Range(_)), "{err}");
    assert!(matches!(run_with("return 1 + (2 + (3));", limits), Ok(Value::Number(n)) if n == 6.0));
}

#[test]
fn test_deep_nesting_is_an_error_not_a_crash() {
    let source = format!("return {}1{};", "(".repeat(5_000), ")".repeat(5_000));
    let err = error_on_script_stack(source, ScriptLimits::default());
    assert!(matches!(err, ScriptError::Syntax { .. }));
    assert!(err.to_string().contains("nested more than"), "{err}");
}

#[test]
fn test_self_containing_array_converts_to_text() {
    assert_eq!(text("const a = [1]; a.push(a); return '' + a;"), "1,");
    assert_eq!(text("const a = [1, 2]; a.push(a); return a.join('-');"), "1-2-");
    assert_eq!(text("const a = []; a.push(a); return `${a}`;"), "");
}

#[test]
fn test_self_containing_array_cannot_be_flattened() {
    let err = error("const a = [cuboid()]; a.push(a); return union(a);");
    assert!(err.starts_with("TypeError:"), "{}", err);
    assert!(err.contains("contains itself"), "{}", err);
}

#[test]
fn test_shared_arrays_cannot_blow_up_flattening() {
    let source = "
        let a = [cuboid()];
        for (let i = 0; i < 30; i++) { a = [a, a]; }
        return union(a);
    ";
    let err = run(source).unwrap_err();
    assert!(matches!(err, ScriptError::Budget(_)));
    assert!(err.to_string().contains("union received more than"), "{err}");

    let limits = ScriptLimits {
        max_polygons: 100,
        ..ScriptLimits::default()
    };
    let err = run_with("let a = []; for (let i = 0; i < 10; i++) { a = [a, a]; } return union(cuboid(), a);", limits)
        .unwrap_err();
    assert!(err.to_string().contains("values to flatten"), "{err}");
}

#[test]
fn test_string_growth_hits_memory_budget() {
    let err = run_with("let s = 'x'; while (true) { s = s + s; }", small_heap()).unwrap_err();
    assert!(matches!(err, ScriptError::Budget(_)));
    assert!(err.to_string().contains("memory budget"), "{err}");
}

#[test]
fn test_array_growth_hits_memory_budget() {
    let err = run_with("const a = []; a[1e7] = 0; return a.length;", small_heap()).unwrap_err();
    assert!(err.to_string().contains("memory budget"), "{err}");

    let err = run_with("let a = [1]; while (true) { a = a.concat(a); }", small_heap()).unwrap_err();
    assert!(err.to_string().contains("memory budget"), "{err}");

    let err = run_with("const a = []; while (true) { a.push(a.length); }", small_heap()).unwrap_err();
    assert!(err.to_string().contains("memory budget"), "{err}");
}

#[test]
fn test_large_revolve_is_refused_before_the_kernel_runs() {
    let source = "
        const points = [];
        for (let i = 0; i < 2000; i++) {
            const t = (2 * Math.PI * i) / 2000;
            points.push([5 + 2 * Math.cos(t), 2 * Math.sin(t)]);
        }
        return revolve({ segments: 512 }, polygon(points));
    ";
    let err = run(source).unwrap_err();
    assert!(matches!(err, ScriptError::Budget(_)));
    assert!(err.to_string().contains("revolve would produce"), "{err}");
}

#[test]
fn test_polygon_budget() {
    let limits = ScriptLimits {
        max_polygons: 10,
        ..ScriptLimits::default()
    };
    let err = run_with("return sphere({ radius: 2 });", limits).unwrap_err();
    assert!(matches!(err, ScriptError::Budget(_)));
}

#[test]
fn test_primitives_build_solids() {
    let value = run("return cuboid({ size: [10, 20, 30], center: [1, 2, 3] });").unwrap();
    let Value::Solid(solid) = value else {
        panic!("expected a solid");
    };
    let (min, max) = solid.bounds().unwrap();
    assert!((min.x + 4.0).abs() < 1e-9 && (max.z - 18.0).abs() < 1e-9);
}

#[test]
fn test_variadic_booleans_flatten_arrays() {
    let source = "
        const PARAMS = { overlap: 0.01 };
        const plate = cuboid({ size: [40, 40, 4] });
        const holes = [-10, 10].map(x => cylinder({ radius: 2, height: 4 + PARAMS.overlap * 2, segments: 32, center: [x, 0, 0] }));
        return subtract(plate, holes);
    ";
    assert!(matches!(run(source), Ok(Value::Solid(_))));
    assert_eq!(
        error("return union();"),
        "TypeError: union requires at least one solid"
    );
    assert_eq!(
        error("return union(cuboid(), 3);"),
        "TypeError: union expects solids, got number"
    );
}

#[test]
fn test_transforms_map_one_or_many() {
    assert!(matches!(run("return translate([1, 0, 0], cuboid());"), Ok(Value::Solid(_))));
    // Arrays are emptied when their interpreter drops, so inspect this one first.
    let interpreter = Interpreter::new(Arc::new(PolygonKernel::new()), ScriptLimits::default());
    let many = interpreter
        .evaluate("return rotate([0, 0, Math.PI / 2], cuboid(), sphere());")
        .unwrap();
    let Value::Array(items) = many else {
        panic!("expected an array");
    };
    assert_eq!(items.borrow().len(), 2);
    assert!(matches!(
        run("return mirror({ normal: [1, 0, 0], origin: [5, 0, 0] }, cuboid());"),
        Ok(Value::Solid(_))
    ));
    assert_eq!(error("return mirror({}, cuboid());"), "TypeError: mirror requires a normal");
}

#[test]
fn test_revolve_profile() {
    let source = "
        const profile = polygon({ points: [[2, 0], [4, 0], [4, 10], [2, 10]] });
        return revolve({ segments: 48 }, profile);
    ";
    assert!(matches!(run(source), Ok(Value::Solid(_))));
    assert!(matches!(run("return revolve(polygon([[0, 0], [1, 0], [0, 1]]));"), Ok(Value::Solid(_))));
    let half = "return revolve({ angle: Math.PI, segments: 16 }, polygon([[2, 0], [4, 0], [4, 10]]));";
    assert!(matches!(run(half), Ok(Value::Solid(_))));
    let err = error("return revolve({}, cuboid());");
    assert_eq!(err, "TypeError: revolve expects a profile from polygon(), got solid");
}

#[test]
fn test_kernel_errors_surface() {
    let err = run("return cuboid({ size: [0, 1, 1] });").unwrap_err();
    assert!(matches!(err, ScriptError::Kernel(_)));
    assert!(err.to_string().starts_with("Error: "));

    let err = error("return cuboid({ size: [1, 'a', 1] });");
    assert!(err.starts_with("TypeError: cuboid: 'size'"), "{}", err);
}

#[test]
fn test_script_without_return_is_undefined() {
    assert!(matches!(run("const a = cuboid();"), Ok(Value::Undefined)));
}
