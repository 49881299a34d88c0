//! End-to-end flows: append interleaved events through a [`StoreWriter`],
//! reopen the store, and fold it into read models.

use std::sync::Arc;

use eventcol::{
    ColumnType, CustomCodec, Decimal, Error, EventStore, Persist, StoreWriter, Timestamp,
    TypeSchema, Uuid, Value,
};

#[derive(Debug, Default, Clone, PartialEq)]
struct OrderPlaced {
    id: Uuid,
    total: Decimal,
    note: Option<String>,
    placed_at: Timestamp,
    lines: Vec<Line>,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Line {
    sku: u32,
    qty: u16,
}

impl Persist for Line {
    fn schema() -> TypeSchema {
        TypeSchema::builder("shop.Line")
            .column("Sku", ColumnType::U32)
            .column("Qty", ColumnType::U16)
            .build()
    }

    fn get(&self, column: usize) -> Value {
        match column {
            0 => Value::U32(self.sku),
            _ => Value::U16(self.qty),
        }
    }

    fn set(&mut self, column: usize, value: Value) {
        match (column, value) {
            (0, Value::U32(v)) => self.sku = v,
            (1, Value::U16(v)) => self.qty = v,
            _ => {}
        }
    }
}

impl Persist for OrderPlaced {
    fn schema() -> TypeSchema {
        TypeSchema::builder("shop.OrderPlaced")
            .column("Id", ColumnType::Uuid)
            .column("Total", ColumnType::Decimal)
            .nullable("Note", ColumnType::Str)
            .column("PlacedAt", ColumnType::Timestamp)
            .column("Lines", ColumnType::List(Arc::new(Line::schema())))
            .build()
    }

    fn get(&self, column: usize) -> Value {
        match column {
            0 => Value::Uuid(self.id),
            1 => Value::Decimal(self.total),
            2 => self.note.clone().map_or(Value::Null, Value::Str),
            3 => Value::Timestamp(self.placed_at),
            _ => Value::Array(self.lines.iter().map(Persist::to_values).collect()),
        }
    }

    fn set(&mut self, column: usize, value: Value) {
        match (column, value) {
            (0, Value::Uuid(v)) => self.id = v,
            (1, Value::Decimal(v)) => self.total = v,
            (2, Value::Str(v)) => self.note = Some(v),
            (2, Value::Null) => self.note = None,
            (3, Value::Timestamp(v)) => self.placed_at = v,
            (4, Value::Array(elements)) => {
                self.lines = elements
                    .into_iter()
                    .map(|values| {
                        let mut line = Line::default();
                        line.apply_values(values);
                        line
                    })
                    .collect();
            }
            _ => {}
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct OrderCancelled {
    id: Uuid,
}

impl Persist for OrderCancelled {
    fn schema() -> TypeSchema {
        TypeSchema::builder("shop.OrderCancelled")
            .column("Id", ColumnType::Uuid)
            .build()
    }

    fn get(&self, _column: usize) -> Value {
        Value::Uuid(self.id)
    }

    fn set(&mut self, _column: usize, value: Value) {
        if let Value::Uuid(v) = value {
            self.id = v;
        }
    }
}

/// View over `shop.OrderPlaced` decoding only the total column.
#[derive(Debug, Default)]
struct OrderTotal {
    total: Decimal,
}

impl Persist for OrderTotal {
    fn schema() -> TypeSchema {
        TypeSchema::builder("shop.OrderTotal")
            .column("Total", ColumnType::Decimal)
            .build()
    }

    fn get(&self, _column: usize) -> Value {
        Value::Decimal(self.total)
    }

    fn set(&mut self, _column: usize, value: Value) {
        if let Value::Decimal(v) = value {
            self.total = v;
        }
    }
}

fn order(n: u32) -> OrderPlaced {
    OrderPlaced {
        id: Uuid::from_u128(u128::from(n)),
        total: Decimal::new(i64::from(n) * 100 + 99, 2),
        note: (n % 2 == 0).then(|| format!("rush order {n}")),
        placed_at: Timestamp::from_unix_seconds(1_700_000_000 + i64::from(n)),
        lines: (0..n % 3).map(|i| Line { sku: n * 10 + i, qty: (i + 1) as u16 }).collect(),
    }
}

#[test]
fn interleaved_append_and_replay_across_reopen() {
    let tmp = tempfile::tempdir().unwrap();

    // Two writer sessions; type ids must survive the reopen.
    {
        let mut writer = StoreWriter::open(tmp.path()).unwrap();
        writer.append(&order(1)).unwrap();
        writer.append(&OrderCancelled { id: Uuid::from_u128(1) }).unwrap();
        writer.append(&order(2)).unwrap();
    }
    {
        let mut writer = StoreWriter::open(tmp.path()).unwrap();
        writer.append(&order(3)).unwrap();
        writer.append(&OrderCancelled { id: Uuid::from_u128(3) }).unwrap();
    }

    #[derive(Debug, Default)]
    struct Timeline {
        placed: Vec<OrderPlaced>,
        cancelled: Vec<Uuid>,
        sequence: Vec<char>,
    }

    let store = EventStore::open(tmp.path()).unwrap();
    let timeline = store
        .project::<Timeline>()
        .on::<OrderPlaced>(|m, e| {
            m.placed.push(e.clone());
            m.sequence.push('p');
        })
        .unwrap()
        .on::<OrderCancelled>(|m, e| {
            m.cancelled.push(e.id);
            m.sequence.push('c');
        })
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(timeline.sequence, ['p', 'c', 'p', 'p', 'c']);
    assert_eq!(timeline.placed, [order(1), order(2), order(3)]);
    assert_eq!(
        timeline.cancelled,
        [Uuid::from_u128(1), Uuid::from_u128(3)]
    );
}

#[test]
fn nullable_and_nested_columns_survive_the_full_roundtrip() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let mut writer = StoreWriter::open(tmp.path()).unwrap();
        for n in 0..6 {
            writer.append(&order(n)).unwrap();
        }
    }

    let store = EventStore::open(tmp.path()).unwrap();
    let orders: Vec<OrderPlaced> = store
        .project()
        .on::<OrderPlaced>(|m: &mut Vec<OrderPlaced>, e| m.push(e.clone()))
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(orders.len(), 6);
    for (n, decoded) in orders.iter().enumerate() {
        assert_eq!(decoded, &order(n as u32), "order {n}");
    }
}

#[test]
fn nullable_decimal_and_enum_preserve_null_patterns() {
    // Nullable decimals take the flag-prefixed scalar path rather than the
    // contiguous batch path, and nullable enums prefix their fixed-width
    // ordinal the same way; both must reproduce the exact null pattern.
    #[derive(Debug, Default, Clone, PartialEq)]
    struct PriceQuoted {
        sku: u32,
        price: Option<Decimal>,
        grade: Option<i64>,
    }

    impl Persist for PriceQuoted {
        fn schema() -> TypeSchema {
            TypeSchema::builder("shop.PriceQuoted")
                .column("Sku", ColumnType::U32)
                .nullable("Price", ColumnType::Decimal)
                .nullable("Grade", ColumnType::Enum { bits: 16 })
                .build()
        }

        fn get(&self, column: usize) -> Value {
            match column {
                0 => Value::U32(self.sku),
                1 => self.price.map_or(Value::Null, Value::Decimal),
                _ => self.grade.map_or(Value::Null, Value::Enum),
            }
        }

        fn set(&mut self, column: usize, value: Value) {
            match (column, value) {
                (0, Value::U32(v)) => self.sku = v,
                (1, Value::Decimal(v)) => self.price = Some(v),
                (1, Value::Null) => self.price = None,
                (2, Value::Enum(v)) => self.grade = Some(v),
                (2, Value::Null) => self.grade = None,
                _ => {}
            }
        }
    }

    fn quote(n: i64) -> PriceQuoted {
        PriceQuoted {
            sku: n as u32,
            price: (n % 2 == 0).then(|| Decimal::new(n * 1000 + 1, 3)),
            // Negative ordinals exercise the signed 16-bit width.
            grade: (n % 3 != 0).then_some(n - 4),
        }
    }

    let tmp = tempfile::tempdir().unwrap();
    {
        let mut writer = StoreWriter::open(tmp.path()).unwrap();
        for n in 0..8 {
            writer.append(&quote(n)).unwrap();
        }
    }

    let store = EventStore::open(tmp.path()).unwrap();
    let quotes = store
        .project::<Vec<PriceQuoted>>()
        .on::<PriceQuoted>(|m, e| m.push(e.clone()))
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(quotes, (0..8).map(quote).collect::<Vec<_>>());
}

#[test]
fn proxy_view_folds_one_column_of_many() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let mut writer = StoreWriter::open(tmp.path()).unwrap();
        for n in 1..=4 {
            writer.append(&order(n)).unwrap();
        }
    }

    let store = EventStore::open(tmp.path()).unwrap();
    let total = store
        .project::<Decimal>()
        .on_proxy::<OrderTotal, OrderPlaced>(|sum, v| *sum += v.total)
        .unwrap()
        .run()
        .unwrap();

    let expected: Decimal = (1..=4).map(|n| Decimal::new(n * 100 + 99, 2)).sum();
    assert_eq!(total, expected);
}

#[test]
fn custom_codec_column_roundtrips_through_the_store() {
    // Stores a u64 as eight big-endian bytes, unlike any built-in rule.
    fn epoch_codec() -> CustomCodec {
        CustomCodec::new(
            |value, w| match value {
                Value::U64(v) => {
                    w.write_all(&v.to_be_bytes())?;
                    Ok(())
                }
                other => Err(Error::ColumnTypeMismatch {
                    column: "Epoch".to_string(),
                    expected: "u64".to_string(),
                    actual: format!("{other:?}"),
                }),
            },
            |r| {
                let mut buf = [0u8; 8];
                r.read_exact(&mut buf)?;
                Ok(Value::U64(u64::from_be_bytes(buf)))
            },
        )
    }

    #[derive(Debug, Default)]
    struct EpochMarked {
        epoch: u64,
    }

    impl Persist for EpochMarked {
        fn schema() -> TypeSchema {
            TypeSchema::builder("shop.EpochMarked")
                .column("Epoch", ColumnType::Custom("epoch"))
                .build()
        }

        fn get(&self, _column: usize) -> Value {
            Value::U64(self.epoch)
        }

        fn set(&mut self, _column: usize, value: Value) {
            if let Value::U64(v) = value {
                self.epoch = v;
            }
        }
    }

    let tmp = tempfile::tempdir().unwrap();
    {
        let mut writer = StoreWriter::open(tmp.path()).unwrap();
        writer.register_codec("epoch", epoch_codec());
        writer.append(&EpochMarked { epoch: 11 }).unwrap();
        writer.append(&EpochMarked { epoch: 22 }).unwrap();
    }

    let mut store = EventStore::open(tmp.path()).unwrap();
    store.register_codec("epoch", epoch_codec());
    let epochs: Vec<u64> = store
        .project()
        .on::<EpochMarked>(|m: &mut Vec<u64>, e| m.push(e.epoch))
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(epochs, [11, 22]);

    // Without the codec, the run must fail at registration.
    let bare = EventStore::open(tmp.path()).unwrap();
    let err = bare
        .project::<Vec<u64>>()
        .on::<EpochMarked>(|m, e| m.push(e.epoch))
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedColumn { .. }));
}

#[test]
fn torn_trailing_value_surfaces_as_unexpected_eof() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let mut writer = StoreWriter::open(tmp.path()).unwrap();
        writer.append(&OrderCancelled { id: Uuid::from_u128(7) }).unwrap();
        writer.append(&OrderCancelled { id: Uuid::from_u128(8) }).unwrap();
    }

    // Simulate an aborted concurrent writer: the index claims a third
    // record but its column file holds only half a uuid.
    let records = tmp.path().join("records.idx");
    let mut index = std::fs::read(&records).unwrap();
    index.extend_from_slice(&[0, 0]);
    std::fs::write(&records, index).unwrap();

    let column = tmp.path().join("shop.OrderCancelled/Id.col");
    let mut bytes = std::fs::read(&column).unwrap();
    bytes.extend_from_slice(&[0xAB; 8]);
    std::fs::write(&column, bytes).unwrap();

    let store = EventStore::open(tmp.path()).unwrap();
    let err = store
        .project::<u64>()
        .on::<OrderCancelled>(|m, _| *m += 1)
        .unwrap()
        .run()
        .unwrap_err();
    match err {
        Error::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
        other => panic!("expected Io(UnexpectedEof), got {other:?}"),
    }
}
