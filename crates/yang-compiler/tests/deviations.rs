use crate::support::{child_names, context, load, node_at};
use pretty_assertions::assert_eq;
use yang_compiler::NodeKind;

const MODULE_A: &str = r#"
module a {
  namespace "urn:a";
  prefix a;
  container x {
    leaf bubba { type string; units "volts"; default "zap"; }
  }
}
"#;

#[test]
fn not_supported_detaches_and_restores() {
    let mut ctx = context();
    let a = load(&mut ctx, MODULE_A);
    let d = load(
        &mut ctx,
        r#"
        module d {
          namespace "urn:d";
          prefix d;
          import a { prefix a; }
          deviation "/a:x/a:bubba" {
            deviate not-supported;
          }
        }
        "#,
    );
    let x = node_at(&ctx, a, "/a:x");
    assert_eq!(child_names(&ctx, a, Some(x)), vec!["bubba"]);

    ctx.implement(d).unwrap();
    assert_eq!(child_names(&ctx, a, Some(x)), Vec::<String>::new());
    assert!(ctx.arena().modules[a].implemented, "target is pulled in");

    ctx.disable(d).unwrap();
    assert_eq!(child_names(&ctx, a, Some(x)), vec!["bubba"]);
    let bubba = node_at(&ctx, a, "/a:x/a:bubba");
    match &ctx.arena().nodes[bubba].kind {
        NodeKind::Leaf(leaf) => {
            assert_eq!(leaf.units.as_ref().map(|u| u.as_str()), Some("volts"));
            assert_eq!(leaf.dflt.as_ref().map(|d| d.as_str()), Some("zap"));
        }
        other => panic!("expected leaf, got {:?}", other.tag()),
    }
}

#[test]
fn deviate_replace_and_delete_properties() {
    let mut ctx = context();
    let a = load(&mut ctx, MODULE_A);
    let d = load(
        &mut ctx,
        r#"
        module dev2 {
          namespace "urn:dev2";
          prefix d2;
          import a { prefix a; }
          deviation "/a:x/a:bubba" {
            deviate replace { default "pow"; }
          }
        }
        "#,
    );
    ctx.implement(d).unwrap();
    let bubba = node_at(&ctx, a, "/a:x/a:bubba");
    match &ctx.arena().nodes[bubba].kind {
        NodeKind::Leaf(leaf) => {
            assert_eq!(leaf.dflt.as_ref().map(|v| v.as_str()), Some("pow"))
        }
        _ => unreachable!(),
    }
    ctx.disable(d).unwrap();
    match &ctx.arena().nodes[bubba].kind {
        NodeKind::Leaf(leaf) => {
            assert_eq!(leaf.dflt.as_ref().map(|v| v.as_str()), Some("zap"))
        }
        _ => unreachable!(),
    }
}

#[test]
fn deviate_add_of_existing_property_fails() {
    let mut ctx = context();
    load(&mut ctx, MODULE_A);
    let d = load(
        &mut ctx,
        r#"
        module dev3 {
          namespace "urn:dev3";
          prefix d3;
          import a { prefix a; }
          deviation "/a:x/a:bubba" {
            deviate add { units "amps"; }
          }
        }
        "#,
    );
    let err = ctx.implement(d).unwrap_err();
    assert_eq!(err.vecode(), "dev-add-exists");
}

#[test]
fn deviate_delete_with_wrong_value_fails() {
    let mut ctx = context();
    load(&mut ctx, MODULE_A);
    let d = load(
        &mut ctx,
        r#"
        module dev4 {
          namespace "urn:dev4";
          prefix d4;
          import a { prefix a; }
          deviation "/a:x/a:bubba" {
            deviate delete { units "watts"; }
          }
        }
        "#,
    );
    let err = ctx.implement(d).unwrap_err();
    assert_eq!(err.vecode(), "dev-delete-mismatch");
}

#[test]
fn not_supported_combined_with_other_deviates_is_rejected() {
    let mut ctx = context();
    load(&mut ctx, MODULE_A);
    let err = ctx
        .load_module_str(
            r#"
            module dev5 {
              namespace "urn:dev5";
              prefix d5;
              import a { prefix a; }
              deviation "/a:x/a:bubba" {
                deviate not-supported;
                deviate add { units "amps"; }
              }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "dev-not-supported-combined");
}

#[test]
fn deviating_own_module_is_rejected() {
    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module selfdev {
          namespace "urn:selfdev";
          prefix sd;
          leaf l { type string; }
          deviation "/l" {
            deviate not-supported;
          }
        }
        "#,
    );
    let err = ctx.implement(m).unwrap_err();
    assert_eq!(err.vecode(), "dev-own-module");
}

#[test]
fn replace_type_revalidates_the_default() {
    let mut ctx = context();
    load(&mut ctx, MODULE_A);
    let d = load(
        &mut ctx,
        r#"
        module dev6 {
          namespace "urn:dev6";
          prefix d6;
          import a { prefix a; }
          deviation "/a:x/a:bubba" {
            deviate replace { type int32; }
          }
        }
        "#,
    );
    // "zap" does not parse as int32 once the type is replaced.
    let err = ctx.implement(d).unwrap_err();
    assert_eq!(err.vecode(), "invalid-default");
}

#[test]
fn replace_type_with_compatible_default_round_trips() {
    let mut ctx = context();
    let a = load(
        &mut ctx,
        r#"
        module numbase {
          namespace "urn:numbase";
          prefix nb;
          leaf n { type string; default "17"; }
        }
        "#,
    );
    let d = load(
        &mut ctx,
        r#"
        module numdev {
          namespace "urn:numdev";
          prefix nd;
          import numbase { prefix nb; }
          deviation "/nb:n" {
            deviate replace { type int32; }
          }
        }
        "#,
    );
    ctx.implement(d).unwrap();
    let n = node_at(&ctx, a, "/numbase:n");
    let ty = ctx.arena().nodes[n].kind.leaf_type().unwrap();
    assert_eq!(ctx.arena().types[ty].base, yang_compiler::TypeBase::Int32);

    ctx.disable(d).unwrap();
    let ty = ctx.arena().nodes[n].kind.leaf_type().unwrap();
    assert_eq!(ctx.arena().types[ty].base, yang_compiler::TypeBase::Str);

    // Re-applying after enable works off the restored snapshot.
    ctx.enable(d).unwrap();
    ctx.implement(d).unwrap();
    let ty = ctx.arena().nodes[n].kind.leaf_type().unwrap();
    assert_eq!(ctx.arena().types[ty].base, yang_compiler::TypeBase::Int32);
}

#[test]
fn deleting_a_list_key_is_rejected() {
    let mut ctx = context();
    load(
        &mut ctx,
        r#"
        module keyed {
          namespace "urn:keyed";
          prefix k;
          list entries {
            key "name";
            leaf name { type string; }
            leaf value { type int32; }
          }
        }
        "#,
    );
    let d = load(
        &mut ctx,
        r#"
        module keydev {
          namespace "urn:keydev";
          prefix kd;
          import keyed { prefix k; }
          deviation "/k:entries/k:name" {
            deviate not-supported;
          }
        }
        "#,
    );
    let err = ctx.implement(d).unwrap_err();
    assert_eq!(err.vecode(), "dev-target-key");
}
