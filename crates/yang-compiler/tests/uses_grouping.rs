use crate::support::{child_names, context, load, node_at, tree};
use expect_test::expect;
use pretty_assertions::assert_eq;
use yang_compiler::{NodeKind, TypeBase};

#[test]
fn uses_inlines_the_grouping_body() {
    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module g1 {
          namespace "urn:g1";
          prefix g;
          grouping endpoint {
            leaf address { type string; }
            leaf port { type uint16; }
          }
          container server {
            uses endpoint;
          }
        }
        "#,
    );
    let server = node_at(&ctx, m, "/g1:server");
    assert_eq!(
        child_names(&ctx, m, Some(server)),
        vec!["address", "port"]
    );
    // The copy belongs to the uses-site module and is fully typed.
    let port = node_at(&ctx, m, "/g1:server/g1:port");
    assert_eq!(ctx.arena().nodes[port].module, m);
    let ty = ctx.arena().nodes[port].kind.leaf_type().unwrap();
    assert_eq!(ctx.arena().types[ty].base, TypeBase::Uint16);
}

#[test]
fn uses_is_transparent_against_an_inlined_definition() {
    let mut ctx = context();
    let used = load(
        &mut ctx,
        r#"
        module viagroup {
          namespace "urn:viagroup";
          prefix v;
          grouping endpoint {
            leaf address { type string; }
            leaf port { type uint16; }
          }
          container server {
            uses endpoint;
            leaf enabled { type boolean; }
          }
        }
        "#,
    );
    let inlined = load(
        &mut ctx,
        r#"
        module inlined {
          namespace "urn:inlined";
          prefix i;
          container server {
            leaf address { type string; }
            leaf port { type uint16; }
            leaf enabled { type boolean; }
          }
        }
        "#,
    );
    let via = tree(&ctx, used);
    expect![[r#"
        container server [rw]
          leaf address [rw]
          leaf port [rw]
          leaf enabled [rw]
    "#]]
    .assert_eq(&via);
    assert_eq!(via, tree(&ctx, inlined));
}

#[test]
fn uses_copies_are_independent_per_site() {
    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module g2 {
          namespace "urn:g2";
          prefix g;
          grouping addr { leaf ip { type string; } }
          container primary { uses addr; }
          container backup { uses addr; }
        }
        "#,
    );
    let primary_ip = node_at(&ctx, m, "/g2:primary/g2:ip");
    let backup_ip = node_at(&ctx, m, "/g2:backup/g2:ip");
    assert_ne!(primary_ip, backup_ip);
}

#[test]
fn groupings_from_imported_modules() {
    let base = r#"
    module gbase {
      namespace "urn:gbase";
      prefix gb;
      grouping creds {
        leaf user { type string; }
      }
    }
    "#;
    let mut ctx = context();
    ctx.set_import_callback(Box::new(move |name, _| {
        (name == "gbase").then(|| base.to_owned())
    }));
    let m = load(
        &mut ctx,
        r#"
        module guser {
          namespace "urn:guser";
          prefix gu;
          import gbase { prefix gb; }
          container login { uses gb:creds; }
        }
        "#,
    );
    let user = node_at(&ctx, m, "/guser:login/guser:user");
    // Copies take the uses-site module, not the grouping's.
    assert_eq!(ctx.arena().nodes[user].module, m);
}

#[test]
fn nested_uses_resolve_inside_groupings() {
    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module g3 {
          namespace "urn:g3";
          prefix g;
          grouping inner { leaf deep { type string; } }
          grouping outer {
            container box { uses inner; }
          }
          uses outer;
        }
        "#,
    );
    node_at(&ctx, m, "/g3:box/g3:deep");
}

#[test]
fn refine_overrides_defaults_and_mandatory() {
    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module rf {
          namespace "urn:rf";
          prefix r;
          grouping tunables {
            leaf speed { type uint32; default "100"; }
            leaf name { type string; }
          }
          container eth {
            uses tunables {
              refine speed { default "1000"; }
              refine name { mandatory true; }
            }
          }
        }
        "#,
    );
    let speed = node_at(&ctx, m, "/rf:eth/rf:speed");
    match &ctx.arena().nodes[speed].kind {
        NodeKind::Leaf(leaf) => {
            assert_eq!(leaf.dflt.as_ref().map(|d| d.as_str()), Some("1000"))
        }
        _ => unreachable!(),
    }
    let name = node_at(&ctx, m, "/rf:eth/rf:name");
    assert!(ctx.arena().nodes[name].is_mandatory());
}

#[test]
fn refined_default_must_match_the_type() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module rfbad {
              namespace "urn:rfbad";
              prefix r;
              grouping g { leaf n { type uint8; } }
              container c {
                uses g {
                  refine n { default "not-a-number"; }
                }
              }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "invalid-default");
}

#[test]
fn uses_augment_extends_the_copy() {
    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module ua {
          namespace "urn:ua";
          prefix u;
          grouping base { container shell { leaf a { type string; } } }
          container top {
            uses base {
              augment "shell" {
                leaf b { type string; }
              }
            }
          }
        }
        "#,
    );
    let shell = node_at(&ctx, m, "/ua:top/ua:shell");
    assert_eq!(child_names(&ctx, m, Some(shell)), vec!["a", "b"]);
}

#[test]
fn grouping_leafrefs_bind_per_instantiation() {
    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module glr {
          namespace "urn:glr";
          prefix g;
          grouping refg {
            leaf myref { type leafref { path "../anchor"; } }
          }
          container c1 {
            leaf anchor { type string; }
            uses refg;
          }
        }
        "#,
    );
    let myref = node_at(&ctx, m, "/glr:c1/glr:myref");
    let anchor = node_at(&ctx, m, "/glr:c1/glr:anchor");
    let ty = ctx.arena().nodes[myref].kind.leaf_type().unwrap();
    assert_eq!(ctx.arena().types[ty].leafref_target(), Some(anchor));
}

#[test]
fn uses_config_follows_the_site() {
    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module ucfg {
          namespace "urn:ucfg";
          prefix u;
          grouping payload { leaf v { type string; } }
          container conf { uses payload; }
          container oper {
            config false;
            uses payload;
          }
        }
        "#,
    );
    let conf_v = node_at(&ctx, m, "/ucfg:conf/ucfg:v");
    let oper_v = node_at(&ctx, m, "/ucfg:oper/ucfg:v");
    assert!(ctx.arena().nodes[conf_v].is_config());
    assert!(!ctx.arena().nodes[oper_v].is_config());
}

#[test]
fn unresolved_grouping_is_a_reference_error() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module missing {
              namespace "urn:missing";
              prefix m;
              container c { uses nothere; }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "unresolved-grouping");
}

#[test]
fn grouping_keys_resolve_in_the_copy() {
    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module gk {
          namespace "urn:gk";
          prefix g;
          grouping table {
            list row {
              key "id";
              leaf id { type uint32; }
              leaf data { type string; }
            }
          }
          container db { uses table; }
        }
        "#,
    );
    let row = node_at(&ctx, m, "/gk:db/gk:row");
    let id = node_at(&ctx, m, "/gk:db/gk:row/gk:id");
    match &ctx.arena().nodes[row].kind {
        NodeKind::List(list) => assert_eq!(list.keys, vec![id]),
        _ => unreachable!(),
    }
}

#[test]
fn grouping_shadowing_is_rejected() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module shadow {
              namespace "urn:shadow";
              prefix s;
              grouping g { leaf a { type string; } }
              container c {
                grouping g { leaf b { type string; } }
              }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "duplicate-identifier");
}
