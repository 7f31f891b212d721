mod common;

use frankenengine_harness::error::LoadError;
use frankenengine_harness::host::HOST_BINDINGS;
use frankenengine_harness::loader::ScriptLoader;
use frankenengine_harness::metadata::{FLAG_NO_STRICT, Strictness};
use frankenengine_harness::selection::expand_selection;

use common::{fixture, loader};

#[test]
fn reference_fixture_metadata_and_includes() {
    let fixture = loader()
        .load(fixture("staging/sm/RegExp/empty-lookahead.js"))
        .expect("load");

    assert_eq!(fixture.id, "staging/sm/RegExp/empty-lookahead.js");
    assert_eq!(fixture.metadata.esid.as_deref(), Some("pending"));
    assert_eq!(
        fixture.metadata.description.as_deref().map(str::trim),
        Some("pending")
    );
    assert!(fixture.metadata.has_flag(FLAG_NO_STRICT));
    assert_eq!(fixture.strictness, Strictness::Sloppy);

    let includes: Vec<_> = fixture.includes.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(includes, vec!["sm/non262.js", "sm/non262-shell.js"]);
    assert_eq!(fixture.source_hash.len(), 64);
}

#[test]
fn unit_puts_includes_before_body_with_all_bindings() {
    let fixture = loader()
        .load(fixture("staging/sm/expressions/computed-property-side-effects.js"))
        .expect("load");
    let unit = fixture.unit();

    let names: Vec<_> = unit.sources().map(|source| source.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "sm/non262.js",
            "sm/non262-shell.js",
            "staging/sm/expressions/computed-property-side-effects.js",
        ]
    );
    assert!(unit.body.text.contains("assertThrowsValue"));
    assert_eq!(unit.bindings, HOST_BINDINGS.to_vec());
}

#[test]
fn default_includes_precede_fixture_includes() {
    let fixture = loader()
        .with_default_includes(vec!["sm/non262-shell.js".to_string()])
        .load(fixture("scripted/isolation-probe.js"))
        .expect("load");
    let includes: Vec<_> = fixture.includes.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(includes, vec!["sm/non262-shell.js", "sm/non262.js"]);
}

#[test]
fn same_fixture_loads_includes_each_time() {
    let loader = loader();
    let first = loader.load(fixture("scripted/isolation-probe.js")).expect("first");
    let second = loader.load(fixture("scripted/isolation-probe.js")).expect("second");
    assert_eq!(first, second);
    assert_eq!(first.includes.len(), 1);
}

#[test]
fn missing_include_names_the_include() {
    let err = loader()
        .load(fixture("scripted/missing-include.js"))
        .expect_err("missing include");
    match err {
        LoadError::IncludeIo { name, .. } => assert_eq!(name, "sm/does-not-exist.js"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn fixture_ids_do_not_depend_on_how_a_fixture_was_selected() {
    let loader = ScriptLoader::new("tests/fixtures/harness").with_fixture_root("tests/fixtures");
    let selected = expand_selection(&[
        "tests/fixtures/scripted/throws-exact.js",
        "./tests/fixtures/scripted/throws-*.js",
    ])
    .expect("expand");
    let ids: Vec<_> = selected.iter().map(|path| loader.fixture_id(path)).collect();
    assert_eq!(
        ids,
        vec![
            "scripted/throws-exact.js",
            "scripted/throws-returns.js",
            "scripted/throws-wrong-value.js",
        ]
    );
}
