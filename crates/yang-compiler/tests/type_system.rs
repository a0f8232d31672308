use crate::support::{context, load, node_at};
use pretty_assertions::assert_eq;
use yang_compiler::{ErrorKind, TypeBase, TypeInfo};

fn leaf_type(ctx: &yang_compiler::Context, module: yang_compiler::ModuleId, path: &str) -> yang_compiler::schema::TypeId {
    let node = node_at(ctx, module, path);
    ctx.arena().nodes[node].kind.leaf_type().unwrap()
}

#[test]
fn typedef_chain_inherits_the_builtin_base() {
    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module chain {
          namespace "urn:chain";
          prefix c;
          typedef percent { type uint8 { range "0..100"; } }
          typedef half { type percent { range "0..50"; } }
          leaf value { type half; }
        }
        "#,
    );
    let ty = leaf_type(&ctx, m, "/chain:value");
    assert_eq!(ctx.arena().types[ty].base, TypeBase::Uint8);
    match &ctx.arena().types[ty].info {
        TypeInfo::Num { range: Some(range) } => assert_eq!(range.parts, vec![(0, 50)]),
        other => panic!("expected numeric info, got {other:?}"),
    }
}

#[test]
fn range_must_narrow() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module widen {
              namespace "urn:widen";
              prefix w;
              typedef small { type uint8 { range "10..20"; } }
              leaf bad { type small { range "5..20"; } }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "invalid-restriction");
}

#[test]
fn length_applies_only_to_strings_and_binary() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module wrong {
              namespace "urn:wrong";
              prefix w;
              leaf bad { type int32 { length "1..5"; } }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "restriction-wrong-base");
}

#[test]
fn default_values_parse_against_the_resolved_type() {
    let mut ctx = context();
    load(
        &mut ctx,
        r#"
        module good {
          namespace "urn:good";
          prefix g;
          leaf a { type int32; default "42"; }
          leaf b { type string { length "1..3"; } default "ok"; }
          leaf c { type boolean; default "true"; }
        }
        "#,
    );

    let err = ctx
        .load_module_str(
            r#"
            module bad {
              namespace "urn:bad";
              prefix b;
              leaf a { type int32; default "forty-two"; }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "invalid-default");
}

#[test]
fn typedef_default_revalidates_under_restriction() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module td {
              namespace "urn:td";
              prefix t;
              typedef ten { type uint8 { range "0..10"; } default "7"; }
              leaf bad { type ten { range "0..5"; } default "7"; }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "invalid-default");
}

#[test]
fn decimal64_requires_fraction_digits_at_the_root() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module dec {
              namespace "urn:dec";
              prefix d;
              leaf bad { type decimal64; }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "fraction-digits-required");

    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module dec2 {
          namespace "urn:dec2";
          prefix d;
          typedef temp { type decimal64 { fraction-digits 2; range "-100..100"; } }
          leaf t { type temp; default "36.6"; }
        }
        "#,
    );
    let ty = leaf_type(&ctx, m, "/dec2:t");
    match &ctx.arena().types[ty].info {
        TypeInfo::Dec64 { digits, .. } => assert_eq!(*digits, 2),
        other => panic!("expected decimal64 info, got {other:?}"),
    }

    // fraction-digits again further down the chain is rejected.
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module dec3 {
              namespace "urn:dec3";
              prefix d;
              typedef temp { type decimal64 { fraction-digits 2; } }
              leaf bad { type temp { fraction-digits 3; } }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "fraction-digits-forbidden");
}

#[test]
fn enum_values_auto_increment() {
    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module en {
          namespace "urn:en";
          prefix e;
          leaf l {
            type enumeration {
              enum zero;
              enum five { value 5; }
              enum six;
            }
            default "five";
          }
        }
        "#,
    );
    let ty = leaf_type(&ctx, m, "/en:l");
    match &ctx.arena().types[ty].info {
        TypeInfo::Enums { enums } => {
            let pairs: Vec<(&str, i64)> =
                enums.iter().map(|e| (e.name.as_str(), e.value)).collect();
            assert_eq!(pairs, vec![("zero", 0), ("five", 5), ("six", 6)]);
        }
        other => panic!("expected enums, got {other:?}"),
    }
}

#[test]
fn enum_narrowing_is_version_gated() {
    let text = |version: &str| {
        format!(
            r#"
            module narrow {{
              namespace "urn:narrow";
              prefix n;
              yang-version {version};
              typedef e {{ type enumeration {{ enum a; enum b; }} }}
              leaf l {{ type e {{ enum a; }} }}
            }}
            "#
        )
    };
    let mut ctx = context();
    let err = ctx.load_module_str(&text("1")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Version);

    let mut ctx = context();
    let m = load(&mut ctx, &text("1.1"));
    let ty = leaf_type(&ctx, m, "/narrow:l");
    match &ctx.arena().types[ty].info {
        TypeInfo::Enums { enums } => {
            assert_eq!(enums.len(), 1);
            assert_eq!(enums[0].name.as_str(), "a");
            // Value inherited from the base enumeration.
            assert_eq!(enums[0].value, 0);
        }
        other => panic!("expected enums, got {other:?}"),
    }
}

#[test]
fn enum_not_in_base_is_rejected() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module nb {
              namespace "urn:nb";
              prefix n;
              yang-version 1.1;
              typedef e { type enumeration { enum a; } }
              leaf l { type e { enum z; } }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "enum-not-in-base");
}

#[test]
fn bits_sort_by_position() {
    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module bt {
          namespace "urn:bt";
          prefix b;
          leaf flags {
            type bits {
              bit late { position 9; }
              bit early { position 2; }
              bit auto;
            }
            default "early auto";
          }
        }
        "#,
    );
    let ty = leaf_type(&ctx, m, "/bt:flags");
    match &ctx.arena().types[ty].info {
        TypeInfo::Bits { bits } => {
            let order: Vec<(&str, u32)> = bits.iter().map(|b| (b.name.as_str(), b.pos)).collect();
            // `auto` takes 10 (one past the highest seen), sorted ascending.
            assert_eq!(order, vec![("early", 2), ("late", 9), ("auto", 10)]);
        }
        other => panic!("expected bits, got {other:?}"),
    }
}

#[test]
fn union_members_resolve_and_flag_pointer_types() {
    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module un {
          namespace "urn:un";
          prefix u;
          yang-version 1.1;
          leaf target { type string; }
          leaf l {
            type union {
              type int32;
              type leafref { path "/target"; }
            }
            default "19";
          }
        }
        "#,
    );
    let ty = leaf_type(&ctx, m, "/un:l");
    match &ctx.arena().types[ty].info {
        TypeInfo::Union {
            types,
            has_ptr_type,
        } => {
            assert_eq!(types.len(), 2);
            assert!(has_ptr_type);
        }
        other => panic!("expected union, got {other:?}"),
    }
}

#[test]
fn v1_unions_reject_leafref_members() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module unv1 {
              namespace "urn:unv1";
              prefix u;
              leaf target { type string; }
              leaf l {
                type union {
                  type int32;
                  type leafref { path "/target"; }
                }
              }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Version);
}

#[test]
fn patterns_restrict_defaults() {
    let mut ctx = context();
    load(
        &mut ctx,
        r#"
        module pat {
          namespace "urn:pat";
          prefix p;
          leaf ok { type string { pattern "[a-z]+"; } default "abc"; }
        }
        "#,
    );

    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module pat2 {
              namespace "urn:pat2";
              prefix p;
              leaf bad { type string { pattern "[a-z]+"; } default "ABC"; }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "invalid-default");
}

#[test]
fn invert_match_patterns() {
    let mut ctx = context();
    load(
        &mut ctx,
        r#"
        module inv {
          namespace "urn:inv";
          prefix i;
          yang-version 1.1;
          leaf l {
            type string {
              pattern "[0-9]+" { modifier invert-match; }
            }
            default "letters";
          }
        }
        "#,
    );
}

#[test]
fn leafref_keys_are_rejected() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module badkey {
              namespace "urn:badkey";
              prefix b;
              leaf other { type string; }
              list l {
                key "k";
                leaf k { type leafref { path "/other"; } }
              }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "invalid-list-key");
}

#[test]
fn config_lists_need_keys() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module nokeys {
              namespace "urn:nokeys";
              prefix n;
              list l {
                leaf v { type string; }
              }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "missing-keys");

    // State lists are fine without keys.
    let mut ctx = context();
    load(
        &mut ctx,
        r#"
        module statelist {
          namespace "urn:statelist";
          prefix s;
          list l {
            config false;
            leaf v { type string; }
          }
        }
        "#,
    );
}

#[test]
fn config_leafref_into_state_is_rejected_even_without_require_instance() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module lrs {
              namespace "urn:lrs";
              prefix l;
              yang-version 1.1;
              container counters {
                config false;
                leaf total { type uint64; }
              }
              leaf watched {
                type leafref {
                  path "/counters/total";
                  require-instance false;
                }
              }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "leafref-into-state");
}

#[test]
fn mandatory_with_default_is_rejected() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module md {
              namespace "urn:md";
              prefix m;
              leaf l { type string; mandatory true; default "x"; }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "mandatory-with-default");
}

#[test]
fn mandatory_under_default_case_is_rejected() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module mdc {
              namespace "urn:mdc";
              prefix m;
              choice ch {
                default one;
                case one {
                  leaf req { type string; mandatory true; }
                }
                case two {
                  leaf alt { type string; }
                }
              }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "mandatory-in-default-case");
}

#[test]
fn choice_default_binds_to_a_case() {
    let mut ctx = context();
    let m = load(
        &mut ctx,
        r#"
        module cd {
          namespace "urn:cd";
          prefix c;
          choice ch {
            default two;
            case one { leaf a { type string; } }
            case two { leaf b { type string; } }
          }
        }
        "#,
    );
    let ch = node_at(&ctx, m, "/cd:ch");
    let two = node_at(&ctx, m, "/cd:ch/cd:two");
    match &ctx.arena().nodes[ch].kind {
        yang_compiler::NodeKind::Choice(c) => assert_eq!(c.dflt, Some(two)),
        _ => unreachable!(),
    }
}

#[test]
fn status_cannot_weaken_down_the_tree() {
    let mut ctx = context();
    let err = ctx
        .load_module_str(
            r#"
            module st {
              namespace "urn:st";
              prefix s;
              container old {
                status obsolete;
                leaf fresh { status current; type string; }
              }
            }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.vecode(), "status-mismatch");
}
