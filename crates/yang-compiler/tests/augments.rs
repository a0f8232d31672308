use crate::support::{child_names, context, load, node_at};
use pretty_assertions::assert_eq;

const MODULE_A: &str = r#"
module a {
  namespace "urn:a";
  prefix a;
  container x {
    leaf bubba { type string; }
  }
}
"#;

const MODULE_C: &str = r#"
module c {
  namespace "urn:c";
  prefix c;
  import a { prefix a; }
  augment "/a:x" {
    leaf extra { type int32; }
  }
}
"#;

#[test]
fn augment_applies_on_implement_and_reverts_on_disable() {
    let mut ctx = context();
    let a = load(&mut ctx, MODULE_A);
    ctx.set_import_callback(Box::new(|name, _| {
        (name == "a").then(|| MODULE_A.to_owned())
    }));
    let c = load(&mut ctx, MODULE_C);

    let x = node_at(&ctx, a, "/a:x");
    assert_eq!(child_names(&ctx, a, Some(x)), vec!["bubba"]);

    ctx.implement(c).unwrap();
    assert_eq!(child_names(&ctx, a, Some(x)), vec!["bubba", "extra"]);
    let extra = node_at(&ctx, c, "/a:x/c:extra");
    assert_eq!(ctx.arena().nodes[extra].module, c);
    // Config inherited from the target.
    assert!(ctx.arena().nodes[extra].is_config());

    ctx.disable(c).unwrap();
    assert_eq!(child_names(&ctx, a, Some(x)), vec!["bubba"]);
}

#[test]
fn augment_disable_enable_cycle_is_lossless() {
    let mut ctx = context();
    let a = load(&mut ctx, MODULE_A);
    let c = load(&mut ctx, MODULE_C);
    let x = node_at(&ctx, a, "/a:x");
    let before = child_names(&ctx, a, Some(x));

    for _ in 0..3 {
        ctx.implement(c).unwrap();
        assert_eq!(
            child_names(&ctx, a, Some(x)),
            vec!["bubba".to_owned(), "extra".to_owned()]
        );
        ctx.disable(c).unwrap();
        assert_eq!(child_names(&ctx, a, Some(x)), before);
        ctx.enable(c).unwrap();
    }
}

#[test]
fn own_module_augment_applies_at_load() {
    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module own {
          namespace "urn:own";
          prefix o;
          container top { }
          augment "/top" {
            leaf added { type string; }
          }
        }
        "#,
    );
    let top = node_at(&ctx, m, "/own:top");
    assert_eq!(child_names(&ctx, m, Some(top)), vec!["added"]);
}

#[test]
fn augmenting_a_choice_wraps_shorthand_cases() {
    let mut ctx = context();
    let a = load(
        &mut ctx,
        r#"
        module chbase {
          namespace "urn:chbase";
          prefix cb;
          container top {
            choice mode {
              leaf plain { type string; }
            }
          }
        }
        "#,
    );
    let c = load(
        &mut ctx,
        r#"
        module chaug {
          namespace "urn:chaug";
          prefix ca;
          import chbase { prefix cb; }
          augment "/cb:top/cb:mode" {
            leaf fancy { type string; }
          }
        }
        "#,
    );
    ctx.implement(c).unwrap();
    let mode = node_at(&ctx, a, "/chbase:top/chbase:mode");
    let cases: Vec<String> = ctx
        .arena()
        .children(a, Some(mode))
        .map(|id| ctx.arena().nodes[id].name.to_string())
        .collect();
    assert_eq!(cases, vec!["plain", "fancy"]);
    // The spliced leaf sits under an implicit case.
    let fancy_case = node_at(&ctx, c, "/chbase:top/chbase:mode/chaug:fancy");
    assert_eq!(
        ctx.arena().nodes[fancy_case].tag(),
        yang_compiler::NodeKindTag::Case
    );

    ctx.disable(c).unwrap();
    let cases: Vec<String> = ctx
        .arena()
        .children(a, Some(mode))
        .map(|id| ctx.arena().nodes[id].name.to_string())
        .collect();
    assert_eq!(cases, vec!["plain"]);
}

#[test]
fn augment_target_must_accept_children() {
    let mut ctx = context();
    load(&mut ctx, MODULE_A);
    let err = ctx
        .load_module_str(
            r#"
            module badaug {
              namespace "urn:badaug";
              prefix ba;
              import a { prefix a; }
              augment "/a:x/a:bubba" {
                leaf impossible { type string; }
              }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "bad-child-kind");
}

#[test]
fn explicit_config_true_under_state_target_is_rejected() {
    let mut ctx = context();
    load(
        &mut ctx,
        r#"
        module stt {
          namespace "urn:stt";
          prefix s;
          container stats { config false; }
        }
        "#,
    );
    let c = load(
        &mut ctx,
        r#"
        module staug {
          namespace "urn:staug";
          prefix sa;
          import stt { prefix s; }
          augment "/s:stats" {
            leaf bad { config true; type string; }
          }
        }
        "#,
    );
    let err = ctx.implement(c).unwrap_err();
    assert_eq!(err.vecode(), "config-true-under-false");
}

#[test]
fn unresolved_augment_target_fails_the_load() {
    let mut ctx = context();
    load(&mut ctx, MODULE_A);
    let err = ctx
        .load_module_str(
            r#"
            module missaug {
              namespace "urn:missaug";
              prefix ma;
              import a { prefix a; }
              augment "/a:nonexistent" {
                leaf l { type string; }
              }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "unresolved-augment-target");
}
