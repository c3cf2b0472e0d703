#![cfg(test)]
use super::decode::*;
use super::encode::{encode, EncodeOptions, FloatWidth};
use super::error::Error;
use super::value::{PathItem, Value};
use hex_literal::hex;
use std::sync::{Arc, Mutex};

fn parse(data: &[u8]) -> Result<Value, Error> {
    decode(data, &DecodeOptions::default())
}

fn ok(data: &[u8]) -> Value {
    parse(data).unwrap()
}

fn text_map(entries: &[(&str, Value)]) -> Value {
    Value::Map(
        entries
            .iter()
            .map(|(k, v)| ((*k).into(), v.clone()))
            .collect(),
    )
}

#[test]
fn rfc_tests() {
    // RFC 8949, Appendix A:
    // https://www.rfc-editor.org/rfc/rfc8949.html#section-appendix.a

    assert_eq!(ok(&hex!("00")), Value::Unsigned(0));
    assert_eq!(ok(&hex!("01")), Value::Unsigned(1));
    assert_eq!(ok(&hex!("0a")), Value::Unsigned(10));
    assert_eq!(ok(&hex!("17")), Value::Unsigned(23));
    assert_eq!(ok(&hex!("1818")), Value::Unsigned(24));
    assert_eq!(ok(&hex!("1819")), Value::Unsigned(25));
    assert_eq!(ok(&hex!("1864")), Value::Unsigned(100));
    assert_eq!(ok(&hex!("1903e8")), Value::Unsigned(1000));
    assert_eq!(ok(&hex!("1a000f4240")), Value::Unsigned(1000000));
    assert_eq!(ok(&hex!("1b000000e8d4a51000")), Value::Unsigned(1000000000000));
    assert_eq!(ok(&hex!("20")), Value::Negative(-1));
    assert_eq!(ok(&hex!("29")), Value::Negative(-10));
    assert_eq!(ok(&hex!("3863")), Value::Negative(-100));
    assert_eq!(ok(&hex!("3903e7")), Value::Negative(-1000));
    assert_eq!(ok(&hex!("3a000f423f")), Value::Negative(-1000000));

    assert_eq!(ok(&hex!("f90000")), Value::Float(0.0));
    assert_eq!(ok(&hex!("f98000")), Value::Float(-0.0));
    assert_eq!(ok(&hex!("f93c00")), Value::Float(1.0));
    assert_eq!(ok(&hex!("fb3ff199999999999a")), Value::Float(1.1));
    assert_eq!(ok(&hex!("f93e00")), Value::Float(1.5));
    assert_eq!(ok(&hex!("f97bff")), Value::Float(65504.0));
    assert_eq!(ok(&hex!("fa47c35000")), Value::Float(100000.0));
    assert_eq!(ok(&hex!("fa7f7fffff")), Value::Float(3.4028234663852886e+38));
    assert_eq!(ok(&hex!("fb7e37e43c8800759c")), Value::Float(1.0e+300));
    assert_eq!(ok(&hex!("f90001")), Value::Float(5.960464477539063e-8));
    assert_eq!(ok(&hex!("f90400")), Value::Float(0.00006103515625));
    assert_eq!(ok(&hex!("f9c400")), Value::Float(-4.0));
    assert_eq!(ok(&hex!("fbc010666666666666")), Value::Float(-4.1));
    assert_eq!(ok(&hex!("f97c00")), Value::Float(f64::INFINITY));
    assert_eq!(ok(&hex!("f9fc00")), Value::Float(f64::NEG_INFINITY));
    assert!(matches!(ok(&hex!("f97e00")), Value::Float(f) if f.is_nan()));
    assert!(matches!(ok(&hex!("fa7fc00000")), Value::Float(f) if f.is_nan()));
    assert!(matches!(ok(&hex!("fb7ff8000000000000")), Value::Float(f) if f.is_nan()));

    assert_eq!(ok(&hex!("f4")), Value::Bool(false));
    assert_eq!(ok(&hex!("f5")), Value::Bool(true));
    assert_eq!(ok(&hex!("f6")), Value::Null);
    assert_eq!(ok(&hex!("f7")), Value::Undefined);

    assert_eq!(ok(&hex!("40")), Value::Bytes(vec![]));
    assert_eq!(ok(&hex!("4401020304")), Value::Bytes(hex!("01020304").to_vec()));

    assert_eq!(ok(&hex!("60")), Value::Text("".into()));
    assert_eq!(ok(&hex!("6161")), Value::Text("a".into()));
    assert_eq!(ok(&hex!("6449455446")), Value::Text("IETF".into()));
    assert_eq!(ok(&hex!("62225c")), Value::Text("\"\\".into()));
    assert_eq!(ok(&hex!("62c3bc")), Value::Text("\u{00fc}".into()));
    assert_eq!(ok(&hex!("63e6b0b4")), Value::Text("\u{6c34}".into()));
    assert_eq!(ok(&hex!("64f0908591")), Value::Text("\u{10151}".into()));

    assert_eq!(ok(&hex!("80")), Value::Array(vec![]));
    assert_eq!(
        ok(&hex!("83010203")),
        Value::Array(vec![1.into(), 2.into(), 3.into()])
    );
    assert_eq!(
        ok(&hex!("8301820203820405")),
        Value::Array(vec![
            1.into(),
            vec![Value::from(2), 3.into()].into(),
            vec![Value::from(4), 5.into()].into(),
        ])
    );
    assert_eq!(
        ok(&hex!("98190102030405060708090a0b0c0d0e0f101112131415161718181819")),
        Value::Array((1..=25).map(Value::from).collect())
    );

    assert_eq!(ok(&hex!("a0")), text_map(&[]));
    assert_eq!(
        ok(&hex!("a26161016162820203")),
        text_map(&[("a", 1.into()), ("b", vec![Value::from(2), 3.into()].into())])
    );
    assert_eq!(
        ok(&hex!("a56161614161626142616361436164614461656145")),
        text_map(&[
            ("a", "A".into()),
            ("b", "B".into()),
            ("c", "C".into()),
            ("d", "D".into()),
            ("e", "E".into()),
        ])
    );
}

#[test]
fn safe_integer_bounds() {
    assert_eq!(ok(&hex!("1b0020000000000000")), Value::Unsigned(9007199254740992));
    assert_eq!(ok(&hex!("3b001fffffffffffff")), Value::Negative(-9007199254740992));

    assert!(matches!(
        parse(&hex!("1b0020000000000001")),
        Err(Error::UnsafeInteger(9007199254740993))
    ));
    assert!(matches!(
        parse(&hex!("3b0020000000000000")),
        Err(Error::UnsafeInteger(-9007199254740993))
    ));
    assert!(matches!(
        parse(&hex!("1bffffffffffffffff")),
        Err(Error::UnsafeInteger(_))
    ));
    assert!(matches!(
        parse(&hex!("3bffffffffffffffff")),
        Err(Error::UnsafeInteger(-18446744073709551616))
    ));
}

#[test]
fn map_key_rules() {
    assert!(matches!(
        parse(&hex!("a2616101616102")),
        Err(Error::InvalidEncoding("duplicate map key"))
    ));
    assert!(matches!(
        parse(&hex!("a10102")),
        Err(Error::InvalidEncoding("non-string map key"))
    ));
}

#[test]
fn unsupported_features() {
    // Tags
    assert!(matches!(
        parse(&hex!("c11a514b67b0")),
        Err(Error::UnsupportedFeature("tagged item"))
    ));
    // Indefinite-length strings, arrays, maps
    assert!(matches!(
        parse(&hex!("5f42010243030405ff")),
        Err(Error::UnsupportedFeature("indefinite-length item"))
    ));
    assert!(matches!(
        parse(&hex!("7f657374726561646d696e67ff")),
        Err(Error::UnsupportedFeature("indefinite-length item"))
    ));
    assert!(matches!(
        parse(&hex!("9f0102ff")),
        Err(Error::UnsupportedFeature("indefinite-length item"))
    ));
    assert!(matches!(
        parse(&hex!("bf61610161629f0203ffff")),
        Err(Error::UnsupportedFeature("indefinite-length item"))
    ));
    // Unassigned simple values
    assert!(matches!(
        parse(&hex!("f0")),
        Err(Error::UnsupportedFeature("unassigned simple value"))
    ));
    assert!(matches!(
        parse(&hex!("f8ff")),
        Err(Error::UnsupportedFeature("unassigned simple value"))
    ));
    // Stray break and reserved additional info
    assert!(matches!(parse(&hex!("ff")), Err(Error::InvalidEncoding(_))));
    assert!(matches!(parse(&hex!("1c")), Err(Error::InvalidEncoding(_))));
}

#[test]
fn premature_end() {
    assert!(matches!(parse(&[]), Err(Error::PrematureEnd)));
    assert!(matches!(parse(&hex!("1b0000")), Err(Error::PrematureEnd)));
    assert!(matches!(parse(&hex!("6361")), Err(Error::PrematureEnd)));
    assert!(matches!(parse(&hex!("820102")), Ok(_)));
    assert!(matches!(parse(&hex!("8201")), Err(Error::PrematureEnd)));
}

#[test]
fn trailing_bytes() {
    assert!(matches!(
        parse(&hex!("0001")),
        Err(Error::InvalidEncoding("trailing bytes after value"))
    ));
}

#[test]
fn invalid_utf8() {
    assert!(matches!(
        parse(&hex!("62c328")),
        Err(Error::InvalidEncoding("invalid utf-8 in text string"))
    ));
}

#[test]
fn min_float_size() {
    let opts = DecodeOptions {
        min_float_size: FloatWidth::F32,
        ..Default::default()
    };
    assert!(matches!(
        decode(&hex!("f93c00"), &opts),
        Err(Error::InvalidEncoding("float narrower than minimum width"))
    ));
    assert_eq!(decode(&hex!("fa3fc00000"), &opts).unwrap(), Value::Float(1.5));

    let opts = DecodeOptions {
        min_float_size: FloatWidth::F64,
        ..Default::default()
    };
    assert!(matches!(
        decode(&hex!("fa3fc00000"), &opts),
        Err(Error::InvalidEncoding("float narrower than minimum width"))
    ));
    assert_eq!(
        decode(&hex!("fb3ff8000000000000"), &opts).unwrap(),
        Value::Float(1.5)
    );
}

#[test]
fn undefined_disallowed() {
    let opts = DecodeOptions {
        allow_undefined: false,
        ..Default::default()
    };
    assert!(matches!(
        decode(&hex!("f7"), &opts),
        Err(Error::UndefinedDisallowed)
    ));
    assert!(matches!(
        decode(&hex!("81f7"), &opts),
        Err(Error::UndefinedDisallowed)
    ));
}

#[test]
fn recursion_limit() {
    let mut data = vec![0x81u8; 16];
    data.push(0x01);
    let opts = DecodeOptions {
        max_depth: 8,
        ..Default::default()
    };
    assert!(matches!(decode(&data, &opts), Err(Error::MaxRecursion)));
    assert!(decode(&data, &DecodeOptions::default()).is_ok());
}

#[test]
fn value_hook_skips_replaced_items() {
    // Replacing without invoking the thunk must still advance the cursor by
    // exactly the replaced item's length, or the trailing map entry would
    // decode as garbage
    let opts = DecodeOptions {
        on_value: Some(Box::new(|_, kind, _| {
            Ok(match kind {
                ItemKind::Array => Some(Value::Null),
                _ => None,
            })
        })),
        ..Default::default()
    };
    let bytes = encode(
        &text_map(&[
            ("xs", vec![Value::from(1), 2.into(), 3.into()].into()),
            ("tail", Value::Bool(true)),
        ]),
        &EncodeOptions::default(),
    )
    .unwrap();
    assert_eq!(
        decode(&bytes, &opts).unwrap(),
        text_map(&[("xs", Value::Null), ("tail", Value::Bool(true))])
    );
}

#[test]
fn value_hook_thunk_memoises() {
    let calls = Arc::new(Mutex::new(0usize));
    let seen = calls.clone();
    let opts = DecodeOptions {
        on_value: Some(Box::new(move |thunk, kind, _| {
            if kind != ItemKind::Text {
                return Ok(None);
            }
            *seen.lock().unwrap() += 1;
            let first = thunk.decode()?;
            let second = thunk.decode()?;
            assert_eq!(first, second);
            Ok(None)
        })),
        ..Default::default()
    };
    assert_eq!(
        decode(&hex!("826449455446626869"), &opts).unwrap(),
        Value::Array(vec!["IETF".into(), "hi".into()])
    );
    assert_eq!(*calls.lock().unwrap(), 2);
}

#[test]
fn value_hook_replacement_after_decode() {
    let opts = DecodeOptions {
        on_value: Some(Box::new(|thunk, kind, _| {
            if kind != ItemKind::Unsigned {
                return Ok(None);
            }
            match thunk.decode()? {
                Value::Unsigned(n) => Ok(Some(Value::Unsigned(n * 2))),
                _ => Ok(None),
            }
        })),
        ..Default::default()
    };
    assert_eq!(
        decode(&hex!("83010203"), &opts).unwrap(),
        Value::Array(vec![
            Value::Unsigned(2),
            Value::Unsigned(4),
            Value::Unsigned(6)
        ])
    );
}

#[test]
fn value_hook_sees_preorder_paths() {
    let seen: Arc<Mutex<Vec<(Vec<PathItem>, ItemKind)>>> = Arc::default();
    let paths = seen.clone();
    let opts = DecodeOptions {
        on_value: Some(Box::new(move |thunk, kind, _| {
            paths.lock().unwrap().push((thunk.key_path().to_vec(), kind));
            Ok(None)
        })),
        ..Default::default()
    };
    let bytes = encode(
        &text_map(&[(
            "a",
            vec![Value::from(10), text_map(&[("b", Value::Bool(true))])].into(),
        )]),
        &EncodeOptions::default(),
    )
    .unwrap();
    decode(&bytes, &opts).unwrap();

    use PathItem::{Index, Key};
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (vec![], ItemKind::Map),
            (vec![Key("a".into())], ItemKind::Array),
            (vec![Key("a".into()), Index(0)], ItemKind::Unsigned),
            (vec![Key("a".into()), Index(1)], ItemKind::Map),
            (
                vec![Key("a".into()), Index(1), Key("b".into())],
                ItemKind::Simple
            ),
        ]
    );
}

#[test]
fn key_hook_remaps_and_skips() {
    // Replacement without decoding the key must skip its bytes exactly
    let opts = DecodeOptions {
        on_key: Some(Box::new(|_, len| {
            Ok(if len == 4 { Some("long".into()) } else { None })
        })),
        ..Default::default()
    };
    let bytes = encode(
        &text_map(&[("weep", 1.into()), ("b", 2.into())]),
        &EncodeOptions::default(),
    )
    .unwrap();
    assert_eq!(
        decode(&bytes, &opts).unwrap(),
        text_map(&[("long", 1.into()), ("b", 2.into())])
    );
}

#[test]
fn key_hook_may_inspect_before_deciding() {
    let opts = DecodeOptions {
        on_key: Some(Box::new(|thunk, _| match thunk.decode()? {
            Value::Text(s) => Ok(Some(s.to_uppercase())),
            _ => Ok(None),
        })),
        ..Default::default()
    };
    let bytes = encode(&text_map(&[("ab", 1.into())]), &EncodeOptions::default()).unwrap();
    assert_eq!(decode(&bytes, &opts).unwrap(), text_map(&[("AB", 1.into())]));
}

#[test]
fn hook_errors_abort() {
    let opts = DecodeOptions {
        on_value: Some(Box::new(|_, kind, _| match kind {
            ItemKind::Float => Err("no floats".into()),
            _ => Ok(None),
        })),
        ..Default::default()
    };
    assert!(matches!(
        decode(&hex!("82f93c0001"), &opts),
        Err(Error::Hook(_))
    ));
}

#[test]
fn round_trip() {
    let value = text_map(&[
        ("unsigned", Value::Unsigned(9007199254740992)),
        ("negative", Value::Negative(-9007199254740992)),
        ("text", "\u{10151} streaming \u{00fc}".into()),
        ("bytes", hex!("deadbeef").to_vec().into()),
        (
            "nested",
            vec![
                Value::Bool(false),
                Value::Null,
                Value::Undefined,
                Value::Float(1.5),
                Value::Float(-0.0),
                Value::Float(1.1),
                text_map(&[("deep", vec![Value::from(-1000000)].into())]),
            ]
            .into(),
        ),
        ("empty", Value::Array(vec![])),
    ]);
    let bytes = encode(&value, &EncodeOptions::default()).unwrap();
    assert_eq!(parse(&bytes).unwrap(), value);
}
