use crate::support::{child_names, context, load, node_at};
use pretty_assertions::assert_eq;
use yang_compiler::{ErrorKind, NodeKind, TypeBase};

const MODULE_A: &str = r#"
module a {
  namespace "urn:a";
  prefix a;
  container x {
    leaf bubba { type string; }
  }
}
"#;

#[test]
fn basic_load() {
    let mut ctx = context();
    let a = load(&mut ctx, MODULE_A);

    assert_eq!(ctx.find_module("a", None), Some(a));
    assert_eq!(ctx.find_module("nope", None), None);

    let x = node_at(&ctx, a, "/a:x");
    assert!(matches!(ctx.arena().nodes[x].kind, NodeKind::Container(_)));
    assert_eq!(child_names(&ctx, a, Some(x)), vec!["bubba"]);

    let bubba = node_at(&ctx, a, "/a:x/a:bubba");
    let ty = ctx.arena().nodes[bubba].kind.leaf_type().unwrap();
    assert_eq!(ctx.arena().types[ty].base, TypeBase::Str);
}

#[test]
fn top_level_nodes_default_to_config() {
    let mut ctx = context();
    let a = load(&mut ctx, MODULE_A);
    let bubba = node_at(&ctx, a, "/a:x/a:bubba");
    assert!(ctx.arena().nodes[bubba].is_config());
}

#[test]
fn config_false_is_inherited() {
    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module state {
          namespace "urn:state";
          prefix st;
          container stats {
            config false;
            leaf counter { type uint64; }
          }
        }
        "#,
    );
    let counter = node_at(&ctx, m, "/state:stats/state:counter");
    assert!(!ctx.arena().nodes[counter].is_config());
}

#[test]
fn config_true_under_false_is_rejected() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module bad {
              namespace "urn:bad";
              prefix b;
              container stats {
                config false;
                leaf c { config true; type string; }
              }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "config-true-under-false");
}

#[test]
fn revisions_sort_newest_first() {
    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module revs {
          namespace "urn:revs";
          prefix r;
          revision 2020-01-01;
          revision 2023-06-15 { description "newer"; }
          revision 2021-12-31;
        }
        "#,
    );
    let dates: Vec<&str> = ctx.arena().modules[m]
        .revisions
        .iter()
        .map(|r| r.date.as_str())
        .collect();
    assert_eq!(dates, vec!["2023-06-15", "2021-12-31", "2020-01-01"]);
    assert_eq!(
        ctx.arena().modules[m].revision().map(|r| r.as_str()),
        Some("2023-06-15")
    );
}

#[test]
fn duplicate_namespace_is_cardinality_error() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module dup {
              namespace "urn:one";
              namespace "urn:two";
              prefix d;
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cardinality);
}

#[test]
fn unknown_type_is_reference_error() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module t {
              namespace "urn:t";
              prefix t;
              leaf l { type no-such-type; }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Reference);
    assert_eq!(ctx.find_module("t", None), None);
}

#[test]
fn failed_load_registers_nothing() {
    let mut ctx = context();
    load(&mut ctx, MODULE_A);
    let before = ctx.module_iter().count();
    assert!(ctx
        .load_module_str("module broken { namespace \"urn:b\"; prefix b; leaf l { } }")
        .is_err());
    assert_eq!(ctx.module_iter().count(), before);
    assert_eq!(ctx.find_module("broken", None), None);
}

#[test]
fn duplicate_sibling_names_are_rejected() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module dup {
              namespace "urn:dup";
              prefix d;
              container c {
                leaf x { type string; }
                leaf x { type int32; }
              }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "duplicate-identifier");
}

#[test]
fn names_collide_through_choice_transparency() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module cc {
              namespace "urn:cc";
              prefix c;
              container c {
                leaf x { type string; }
                choice ch {
                  case one { leaf x { type int32; } }
                }
              }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "duplicate-identifier");
}

#[test]
fn import_resolves_through_the_callback() {
    let mut ctx = context();
    ctx.set_import_callback(Box::new(|name, _rev| {
        (name == "a").then(|| MODULE_A.to_owned())
    }));
    let b = load(
        &mut ctx,
        r#"
        module b {
          namespace "urn:b";
          prefix b;
          import a { prefix a; }
          leaf r { type leafref { path "/a:x/a:bubba"; } }
        }
        "#,
    );
    assert!(ctx.find_module("a", None).is_some());

    let r = node_at(&ctx, b, "/b:r");
    let ty = ctx.arena().nodes[r].kind.leaf_type().unwrap();
    let a = ctx.find_module("a", None).unwrap();
    let bubba = node_at(&ctx, a, "/a:x/a:bubba");
    assert_eq!(ctx.arena().types[ty].leafref_target(), Some(bubba));

    // The target leaf knows its referrers.
    match &ctx.arena().nodes[bubba].kind {
        NodeKind::Leaf(leaf) => assert!(leaf.backlinks.contains(&r)),
        other => panic!("expected leaf, got {:?}", other.tag()),
    }

    // Implementing b pulls a into the implemented set (leafref target).
    ctx.implement(b).unwrap();
    assert!(ctx.arena().modules[a].implemented);
}

#[test]
fn import_cycles_are_reported() {
    let a = r#"
    module cyc-a {
      namespace "urn:cyc-a";
      prefix ca;
      import cyc-b { prefix cb; }
    }
    "#;
    let b = r#"
    module cyc-b {
      namespace "urn:cyc-b";
      prefix cb;
      import cyc-a { prefix ca; }
    }
    "#;
    let mut ctx = context();
    ctx.set_import_callback(Box::new(move |name, _| match name {
        "cyc-a" => Some(a.to_owned()),
        "cyc-b" => Some(b.to_owned()),
        _ => None,
    }));
    let err = ctx.load_module_str(a).unwrap_err();
    assert_eq!(err.vecode(), "import-cycle");
}

#[test]
fn unknown_prefix_in_path_is_reported() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module p {
              namespace "urn:p";
              prefix p;
              leaf l { type leafref { path "/zz:x"; } }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "unknown-prefix");
}

#[test]
fn module_set_id_increases_on_load() {
    let mut ctx = context();
    let before = ctx.set_id();
    load(&mut ctx, MODULE_A);
    assert!(ctx.set_id() > before);
}

#[test]
fn searchdirs_find_newest_revision() {
    let dir = std::env::temp_dir().join(format!("yang-compiler-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("disc@2020-01-01.yang"),
        "module disc { namespace \"urn:disc\"; prefix d; revision 2020-01-01; }",
    )
    .unwrap();
    std::fs::write(
        dir.join("disc@2022-02-02.yang"),
        "module disc { namespace \"urn:disc\"; prefix d; revision 2022-02-02; }",
    )
    .unwrap();

    let mut ctx = context();
    ctx.add_searchdir(&dir);
    let m = ctx.load("disc", None).unwrap();
    assert_eq!(
        ctx.arena().modules[m].revision().map(|r| r.as_str()),
        Some("2022-02-02")
    );

    let old = ctx.load("disc", Some("2020-01-01")).unwrap();
    assert_ne!(m, old);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn rpc_gets_implicit_input_and_output() {
    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module ops {
          namespace "urn:ops";
          prefix o;
          rpc reset {
            input { leaf delay { type uint32; } }
          }
        }
        "#,
    );
    let rpc = node_at(&ctx, m, "/ops:reset");
    let kinds: Vec<_> = ctx
        .arena()
        .children(m, Some(rpc))
        .map(|id| ctx.arena().nodes[id].tag())
        .collect();
    assert_eq!(kinds.len(), 2);
    let output = node_at(&ctx, m, "/ops:reset/ops:output");
    assert!(ctx.arena().nodes[output]
        .flags
        .contains(yang_compiler::NodeFlags::IMPLICIT));
    // Config never applies inside operations.
    let delay = node_at(&ctx, m, "/ops:reset/ops:input/ops:delay");
    assert!(!ctx.arena().nodes[delay].is_config());
}
