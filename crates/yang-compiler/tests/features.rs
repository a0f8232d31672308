use crate::support::{context, load, node_at};
use pretty_assertions::assert_eq;
use yang_compiler::ErrorKind;

#[test]
fn circular_features_fail_the_load() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module circ {
              namespace "urn:circ";
              prefix c;
              feature f { if-feature g; }
              feature g { if-feature f; }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Reference);
    assert_eq!(err.vecode(), "circular-feature");
    assert_eq!(ctx.find_module("circ", None), None);
}

#[test]
fn feature_chain_without_cycle_loads() {
    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module chain {
          namespace "urn:chain";
          prefix c;
          feature base;
          feature extended { if-feature base; }
          leaf l { if-feature extended; type string; }
        }
        "#,
    );
    let features = &ctx.arena().modules[m].features;
    assert_eq!(features.len(), 2);
    let base = features[0];
    // `extended` registered itself as a dependent of `base`.
    assert_eq!(ctx.arena().features[base].dependents.len(), 1);
}

#[test]
fn feature_enable_respects_prerequisites() {
    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module gates {
          namespace "urn:gates";
          prefix g;
          feature base;
          feature extended { if-feature base; }
        }
        "#,
    );
    // `extended` cannot be enabled while `base` is off.
    assert!(ctx.set_feature(m, "extended", true).is_err());
    ctx.set_feature(m, "base", true).unwrap();
    ctx.set_feature(m, "extended", true).unwrap();
    let extended = ctx.arena().modules[m].features[1];
    assert!(ctx.arena().features[extended].enabled);
}

#[test]
fn v1_rejects_if_feature_expressions() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module v1expr {
              namespace "urn:v1expr";
              prefix v;
              feature a;
              feature b;
              leaf l { if-feature "a and b"; type string; }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Version);
}

#[test]
fn v1_1_accepts_if_feature_expressions() {
    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module v11expr {
          namespace "urn:v11expr";
          prefix v;
          yang-version 1.1;
          feature a;
          feature b;
          leaf l { if-feature "a and not (b or a)"; type string; }
        }
        "#,
    );
    let l = node_at(&ctx, m, "/v11expr:l");
    assert_eq!(ctx.arena().nodes[l].iffeatures.len(), 1);
    // a=off, b=off: "a and not (b or a)" is false.
    assert!(!ctx.arena().nodes[l].iffeatures[0].evaluate(&ctx.arena().features));
}

#[test]
fn unresolved_feature_reference_fails() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module missing {
              namespace "urn:missing";
              prefix m;
              leaf l { if-feature ghost; type string; }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "unresolved-feature");
}

#[test]
fn identity_lattice_builds_derived_links() {
    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module idents {
          namespace "urn:idents";
          prefix i;
          identity transport;
          identity tcp { base transport; }
          identity tls { base tcp; }
          leaf proto {
            type identityref { base transport; }
            default "tls";
          }
        }
        "#,
    );
    let ids = &ctx.arena().modules[m].identities;
    assert_eq!(ids.len(), 3);
    let transport = ids[0];
    let tcp = ids[1];
    assert_eq!(ctx.arena().identities[transport].derived, vec![tcp]);
}

#[test]
fn identity_base_cycle_is_rejected() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module identcyc {
              namespace "urn:identcyc";
              prefix ic;
              identity a { base b; }
              identity b { base a; }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "circular-identity");
}

#[test]
fn identityref_default_must_derive_from_base() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module badident {
              namespace "urn:badident";
              prefix bi;
              identity transport;
              identity color;
              leaf proto {
                type identityref { base transport; }
                default "color";
              }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "invalid-default");
}

#[test]
fn multiple_identityref_bases_require_v1_1() {
    let text = |version: &str| {
        format!(
            r#"
            module multibase {{
              namespace "urn:multibase";
              prefix mb;
              yang-version {version};
              identity a;
              identity b;
              leaf l {{
                type identityref {{ base a; base b; }}
              }}
            }}
            "#
        )
    };
    let mut ctx = context();
    let err = ctx.load_module_str(&text("1")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Version);

    let mut ctx = context();
    load(&mut ctx, &text("1.1"));
}
