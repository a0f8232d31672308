use crate::support::{context, load};
use pretty_assertions::assert_eq;

const MODULE_A: &str = r#"
module a {
  namespace "urn:a";
  prefix a;
  container x { leaf bubba { type string; } }
}
"#;

const MODULE_B: &str = r#"
module b {
  namespace "urn:b";
  prefix b;
  import a { prefix a; }
  leaf r { type leafref { path "/a:x/a:bubba"; } }
}
"#;

#[test]
fn set_id_is_monotonic_across_lifecycle_calls() {
    let mut ctx = context();
    let a = load(&mut ctx, MODULE_A);
    let mut last = ctx.set_id();

    ctx.implement(a).unwrap();
    assert!(ctx.set_id() > last);
    last = ctx.set_id();

    ctx.disable(a).unwrap();
    assert!(ctx.set_id() > last);
    last = ctx.set_id();

    ctx.enable(a).unwrap();
    assert!(ctx.set_id() > last);
    last = ctx.set_id();

    ctx.remove(a).unwrap();
    assert!(ctx.set_id() > last);
}

#[test]
fn disabled_modules_drop_out_of_lookups() {
    let mut ctx = context();
    let a = load(&mut ctx, MODULE_A);
    assert_eq!(ctx.find_module("a", None), Some(a));

    ctx.disable(a).unwrap();
    assert_eq!(ctx.find_module("a", None), None);
    assert_eq!(ctx.disabled_iter().count(), 1);

    ctx.enable(a).unwrap();
    assert_eq!(ctx.find_module("a", None), Some(a));
}

#[test]
fn disable_fails_with_an_implemented_dependent() {
    let mut ctx = context();
    let a = load(&mut ctx, MODULE_A);
    let b = load(&mut ctx, MODULE_B);
    ctx.implement(b).unwrap();

    let err = ctx.disable(a).unwrap_err();
    assert_eq!(err.vecode(), "has-implemented-dependents");

    // Once the dependent goes away the module can be disabled.
    ctx.disable(b).unwrap();
    ctx.disable(a).unwrap();
}

#[test]
fn remove_pulls_exclusive_dependencies() {
    let mut ctx = context();
    ctx.set_import_callback(Box::new(|name, _| {
        (name == "a").then(|| MODULE_A.to_owned())
    }));
    let b = load(&mut ctx, MODULE_B);
    assert!(ctx.find_module("a", None).is_some());

    ctx.remove(b).unwrap();
    assert_eq!(ctx.find_module("b", None), None);
    // `a` existed only as b's dependency.
    assert_eq!(ctx.find_module("a", None), None);
    assert_eq!(ctx.module_iter().count(), 0);
}

#[test]
fn remove_keeps_modules_with_other_importers() {
    let mut ctx = context();
    let _a = load(&mut ctx, MODULE_A);
    let b = load(&mut ctx, MODULE_B);
    let _c = load(
        &mut ctx,
        r#"
        module c2 {
          namespace "urn:c2";
          prefix c2;
          import a { prefix a; }
          leaf other { type leafref { path "/a:x/a:bubba"; } }
        }
        "#,
    );
    ctx.remove(b).unwrap();
    assert!(ctx.find_module("a", None).is_some());
    assert!(ctx.find_module("c2", None).is_some());
}

#[test]
fn remove_refuses_while_leafref_referrers_are_implemented() {
    let mut ctx = context();
    let a = load(&mut ctx, MODULE_A);
    let b = load(&mut ctx, MODULE_B);
    ctx.implement(b).unwrap();
    let err = ctx.remove(a).unwrap_err();
    assert_eq!(err.vecode(), "has-implemented-dependents");
    assert!(ctx.find_module("a", None).is_some());
}

#[test]
fn clean_empties_the_context() {
    let mut ctx = context();
    load(&mut ctx, MODULE_A);
    load(&mut ctx, MODULE_B);
    ctx.clean();
    assert_eq!(ctx.module_iter().count(), 0);
    assert_eq!(ctx.disabled_iter().count(), 0);
}

#[test]
fn only_one_revision_may_be_implemented() {
    let old = r#"
    module rev {
      namespace "urn:rev";
      prefix r;
      revision 2020-01-01;
    }
    "#;
    let new = r#"
    module rev {
      namespace "urn:rev";
      prefix r;
      revision 2021-01-01;
    }
    "#;
    let mut ctx = context();
    let m_old = load(&mut ctx, old);
    let m_new = load(&mut ctx, new);
    assert_ne!(m_old, m_new);

    ctx.implement(m_old).unwrap();
    let err = ctx.implement(m_new).unwrap_err();
    assert_eq!(err.vecode(), "already-implemented");
}

#[test]
fn loading_the_same_revision_twice_merges() {
    let mut ctx = context();
    let first = load(&mut ctx, MODULE_A);
    let second = load(&mut ctx, MODULE_A);
    assert_eq!(first, second);
    assert_eq!(ctx.module_iter().count(), 1);
}

#[test]
fn submodule_contents_merge_into_the_owner() {
    let sub = r#"
    submodule sub {
      belongs-to main { prefix m; }
      typedef shared { type int32 { range "1..10"; } }
      leaf from-sub { type shared; }
    }
    "#;
    let mut ctx = context();
    ctx.set_import_callback(Box::new(move |name, _| {
        (name == "sub").then(|| sub.to_owned())
    }));
    let m = load(
        &mut ctx,
        r#"
        module main {
          namespace "urn:main";
          prefix m;
          include sub;
          leaf local { type shared; }
        }
        "#,
    );
    let names: Vec<String> = ctx
        .arena()
        .children(m, None)
        .map(|id| ctx.arena().nodes[id].name.to_string())
        .collect();
    assert_eq!(names, vec!["from-sub", "local"]);
}
