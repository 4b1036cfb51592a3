mod common;

use stdb_client::{
    AlgebraicType, AlgebraicValue, Column, Decoder, Encoder, Error, Field, I256Bits, U256Bits,
};

fn roundtrip(ty: &AlgebraicType, value: &AlgebraicValue) {
    let mut enc = Encoder::new();
    enc.encode_value(value).unwrap();
    let bytes = enc.into_bytes();
    let mut dec = Decoder::new(&bytes);
    assert_eq!(&dec.decode_value(ty).unwrap(), value);
    assert_eq!(dec.remaining(), 0);
}

#[test]
fn primitive_frame_is_byte_exact() {
    // E1: u32 0xDEADBEEF then i32 -100000.
    let mut enc = Encoder::new();
    enc.put_u32(0xDEADBEEF);
    enc.put_i32(-100_000);
    let bytes = enc.into_bytes();
    assert_eq!(bytes, [0xEF, 0xBE, 0xAD, 0xDE, 0x60, 0x79, 0xFE, 0xFF]);

    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.get_u32().unwrap(), 0xDEADBEEF);
    assert_eq!(dec.get_i32().unwrap(), -100_000);
    assert_eq!(dec.remaining(), 0);
}

#[test]
fn option_u64_wire_bytes() {
    // E2: Some(42) and None under option(u64).
    let ty = AlgebraicType::Option(Box::new(AlgebraicType::U64));
    let some = AlgebraicValue::OptionVal(Some(Box::new(AlgebraicValue::U64(42))));
    let none = AlgebraicValue::OptionVal(None);

    let mut enc = Encoder::new();
    enc.encode_value(&some).unwrap();
    assert_eq!(enc.into_bytes(), [0x00, 0x2A, 0, 0, 0, 0, 0, 0, 0]);

    let mut enc = Encoder::new();
    enc.encode_value(&none).unwrap();
    assert_eq!(enc.into_bytes(), [0x01]);

    roundtrip(&ty, &some);
    roundtrip(&ty, &none);
}

#[test]
fn u32_little_endian_reconstruction() {
    for n in [0u32, 1, 255, 256, 0xDEAD_BEEF, u32::MAX] {
        let mut enc = Encoder::new();
        enc.put_u32(n);
        let b = enc.into_bytes();
        assert_eq!(b.len(), 4);
        let rebuilt =
            u32::from(b[0]) | u32::from(b[1]) << 8 | u32::from(b[2]) << 16 | u32::from(b[3]) << 24;
        assert_eq!(rebuilt, n);
    }
}

#[test]
fn string_length_framing() {
    for s in ["", "a", "hello world", "ünïcødé"] {
        let mut enc = Encoder::new();
        enc.put_str(s).unwrap();
        let bytes = enc.into_bytes();
        assert_eq!(bytes.len(), 4 + s.len());
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.get_u32().unwrap() as usize, s.len());
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.get_str().unwrap(), s);
    }
}

#[test]
fn empty_string_is_four_zero_bytes() {
    let mut enc = Encoder::new();
    enc.put_str("").unwrap();
    assert_eq!(enc.into_bytes(), [0, 0, 0, 0]);
}

#[test]
fn empty_array_is_four_zero_bytes() {
    let mut enc = Encoder::new();
    enc.encode_value(&AlgebraicValue::Array(vec![])).unwrap();
    assert_eq!(enc.into_bytes(), [0, 0, 0, 0]);
}

#[test]
fn integer_extremes_roundtrip() {
    roundtrip(&AlgebraicType::U8, &AlgebraicValue::U8(0));
    roundtrip(&AlgebraicType::U8, &AlgebraicValue::U8(255));
    roundtrip(&AlgebraicType::I8, &AlgebraicValue::I8(-128));
    roundtrip(&AlgebraicType::I8, &AlgebraicValue::I8(127));
    roundtrip(&AlgebraicType::U128, &AlgebraicValue::U128(u128::MAX));
    roundtrip(&AlgebraicType::I128, &AlgebraicValue::I128(i128::MIN));
}

#[test]
fn wide_integers_are_opaque_bytes() {
    let mut raw = [0u8; 32];
    raw[0] = 0xFF;
    raw[31] = 0x01;
    roundtrip(
        &AlgebraicType::U256,
        &AlgebraicValue::U256(U256Bits::from_bytes(raw)),
    );
    roundtrip(
        &AlgebraicType::I256,
        &AlgebraicValue::I256(I256Bits::from_bytes(raw)),
    );

    let mut enc = Encoder::new();
    enc.encode_value(&AlgebraicValue::U256(U256Bits::from_bytes(raw)))
        .unwrap();
    assert_eq!(enc.into_bytes(), raw);
}

#[test]
fn composite_roundtrips() {
    let ty = AlgebraicType::Product(vec![
        Column::named("id", AlgebraicType::U64),
        Column::named(
            "aliases",
            AlgebraicType::Array(Box::new(AlgebraicType::String)),
        ),
        Column::named(
            "score",
            AlgebraicType::Option(Box::new(AlgebraicType::F32)),
        ),
        Column::named(
            "status",
            AlgebraicType::Sum(vec![
                Column::named("active", AlgebraicType::Bool),
                Column::named("banned", AlgebraicType::String),
            ]),
        ),
    ]);
    let value = AlgebraicValue::Product(vec![
        Field::named("id", AlgebraicValue::U64(99)),
        Field::named(
            "aliases",
            AlgebraicValue::Array(vec![
                AlgebraicValue::String("a".into()),
                AlgebraicValue::String("bb".into()),
            ]),
        ),
        Field::named(
            "score",
            AlgebraicValue::OptionVal(Some(Box::new(AlgebraicValue::F32(0.5)))),
        ),
        Field::named(
            "status",
            AlgebraicValue::Sum {
                tag: 1,
                value: Box::new(AlgebraicValue::String("gone".into())),
            },
        ),
    ]);
    roundtrip(&ty, &value);
}

#[test]
fn product_encoding_is_field_concatenation() {
    let value = AlgebraicValue::Product(vec![
        Field::named("a", AlgebraicValue::U16(0x0102)),
        Field::named("b", AlgebraicValue::Bool(true)),
    ]);
    let mut enc = Encoder::new();
    enc.encode_value(&value).unwrap();
    assert_eq!(enc.into_bytes(), [0x02, 0x01, 0x01]);
}

#[test]
fn strict_tag_bytes() {
    let mut dec = Decoder::new(&[0x02]);
    assert!(matches!(dec.get_bool(), Err(Error::InvalidBool(0x02))));

    let ty = AlgebraicType::Option(Box::new(AlgebraicType::U8));
    let mut dec = Decoder::new(&[0x03, 0x00]);
    assert!(matches!(
        dec.decode_value(&ty),
        Err(Error::InvalidOptionTag(0x03))
    ));

    let sum = AlgebraicType::Sum(vec![Column::named("only", AlgebraicType::U8)]);
    let mut dec = Decoder::new(&[0x01, 0x00]);
    assert!(matches!(
        dec.decode_value(&sum),
        Err(Error::InvalidSumTag { tag: 1, variants: 1 })
    ));
}

#[test]
fn short_buffer_reports_needed_bytes() {
    let mut dec = Decoder::new(&[0x01]);
    let err = dec.get_u64().unwrap_err();
    assert!(matches!(
        err,
        Error::BufferTooShort {
            needed: 8,
            remaining: 1
        }
    ));
}
