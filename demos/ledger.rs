//! Self-contained example demonstrating the columnar store: appending
//! interleaved event types, replaying them into a read model, and reading
//! a column subset through a proxy view.
//!
//! Run with: `cargo run --example ledger`
//!
//! Writes its store under a temp directory and removes it on exit.

use eventcol::{
    ColumnType, Decimal, EventStore, Persist, StoreWriter, Timestamp, TypeSchema, Uuid, Value,
};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Money arrived in an account.
#[derive(Debug, Default)]
struct Deposited {
    account: Uuid,
    amount: Decimal,
    at: Timestamp,
}

impl Persist for Deposited {
    fn schema() -> TypeSchema {
        TypeSchema::builder("ledger.Deposited")
            .column("Account", ColumnType::Uuid)
            .column("Amount", ColumnType::Decimal)
            .column("At", ColumnType::Timestamp)
            .build()
    }

    fn get(&self, column: usize) -> Value {
        match column {
            0 => Value::Uuid(self.account),
            1 => Value::Decimal(self.amount),
            _ => Value::Timestamp(self.at),
        }
    }

    fn set(&mut self, column: usize, value: Value) {
        match (column, value) {
            (0, Value::Uuid(v)) => self.account = v,
            (1, Value::Decimal(v)) => self.amount = v,
            (2, Value::Timestamp(v)) => self.at = v,
            _ => {}
        }
    }
}

/// Money left an account.
#[derive(Debug, Default)]
struct Withdrawn {
    account: Uuid,
    amount: Decimal,
    at: Timestamp,
}

impl Persist for Withdrawn {
    fn schema() -> TypeSchema {
        TypeSchema::builder("ledger.Withdrawn")
            .column("Account", ColumnType::Uuid)
            .column("Amount", ColumnType::Decimal)
            .column("At", ColumnType::Timestamp)
            .build()
    }

    fn get(&self, column: usize) -> Value {
        match column {
            0 => Value::Uuid(self.account),
            1 => Value::Decimal(self.amount),
            _ => Value::Timestamp(self.at),
        }
    }

    fn set(&mut self, column: usize, value: Value) {
        match (column, value) {
            (0, Value::Uuid(v)) => self.account = v,
            (1, Value::Decimal(v)) => self.amount = v,
            (2, Value::Timestamp(v)) => self.at = v,
            _ => {}
        }
    }
}

/// Proxy view over `ledger.Deposited` reading only the amount column.
#[derive(Debug, Default)]
struct DepositAmount {
    amount: Decimal,
}

impl Persist for DepositAmount {
    fn schema() -> TypeSchema {
        TypeSchema::builder("ledger.DepositAmount")
            .column("Amount", ColumnType::Decimal)
            .build()
    }

    fn get(&self, _column: usize) -> Value {
        Value::Decimal(self.amount)
    }

    fn set(&mut self, _column: usize, value: Value) {
        if let Value::Decimal(v) = value {
            self.amount = v;
        }
    }
}

// ---------------------------------------------------------------------------
// Read model
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Balance {
    total: Decimal,
    movements: u64,
}

fn main() -> eventcol::Result<()> {
    tracing_subscriber::fmt::init();

    let dir = std::env::temp_dir().join(format!("eventcol-demo-{}", std::process::id()));
    let account = Uuid::new_v4();

    {
        let mut writer = StoreWriter::open(&dir)?;
        writer.append(&Deposited {
            account,
            amount: Decimal::new(10_000, 2), // 100.00
            at: Timestamp::from_unix_seconds(1_700_000_000),
        })?;
        writer.append(&Withdrawn {
            account,
            amount: Decimal::new(2_550, 2), // 25.50
            at: Timestamp::from_unix_seconds(1_700_000_060),
        })?;
        writer.append(&Deposited {
            account,
            amount: Decimal::new(999, 2), // 9.99
            at: Timestamp::from_unix_seconds(1_700_000_120),
        })?;
        writer.flush()?;
    }

    let store = EventStore::open(&dir)?;

    // Full replay in write order, both types interleaved.
    let balance = store
        .project::<Balance>()
        .on::<Deposited>(|m, e| {
            m.total += e.amount;
            m.movements += 1;
        })?
        .on::<Withdrawn>(|m, e| {
            m.total -= e.amount;
            m.movements += 1;
        })?
        .run()?;
    println!(
        "balance after {} movements: {}",
        balance.movements, balance.total
    );

    // Proxy replay: decode only the Amount column of deposits.
    let deposited = store
        .project::<Decimal>()
        .on_proxy::<DepositAmount, Deposited>(|sum, v| *sum += v.amount)?
        .run()?;
    println!("total deposited: {deposited}");

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
