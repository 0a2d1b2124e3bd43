use super::{Migration, SimpleSqlMigration};

pub fn migration() -> impl Migration {
    SimpleSqlMigration {
        serial_number: 0,
        sql: vec![
            r#"
            CREATE TABLE users (
                id UUID PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                is_staff BOOLEAN NOT NULL,
                created TIMESTAMP WITH TIME ZONE NOT NULL
            )"#,
            r#"CREATE INDEX user_email ON users (email)"#,
            r#"
            CREATE TABLE auth_tokens (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users,
                name TEXT UNIQUE NOT NULL,
                token_hash TEXT UNIQUE NOT NULL,
                created TIMESTAMP WITH TIME ZONE NOT NULL,
                disabled TIMESTAMP WITH TIME ZONE
            )"#,
            r#"
            CREATE TABLE wallets (
                id UUID PRIMARY KEY,
                user_id UUID UNIQUE NOT NULL REFERENCES users,
                balance NUMERIC(12, 2) NOT NULL CHECK (balance >= 0),
                updated TIMESTAMP WITH TIME ZONE NOT NULL
            )"#,
            r#"
            CREATE TABLE topups (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users,
                amount NUMERIC(12, 2) NOT NULL CHECK (amount > 0),
                proof TEXT NOT NULL,
                reference TEXT NOT NULL,
                status INT NOT NULL,
                created TIMESTAMP WITH TIME ZONE NOT NULL,
                reviewed_by UUID REFERENCES users,
                reviewed_at TIMESTAMP WITH TIME ZONE,
                admin_note TEXT
            )"#,
            r#"CREATE INDEX topup_status_created ON topups (status, created)"#,
            r#"CREATE INDEX topup_user_created ON topups (user_id, created)"#,
            r#"
            CREATE TABLE orders (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users,
                delivery_address TEXT NOT NULL,
                phone TEXT NOT NULL,
                total_amount NUMERIC(12, 2) NOT NULL CHECK (total_amount > 0),
                payment_method INT NOT NULL,
                is_paid BOOLEAN NOT NULL,
                created TIMESTAMP WITH TIME ZONE NOT NULL
            )"#,
            r#"CREATE INDEX order_user_created ON orders (user_id, created)"#,
            r#"
            CREATE TABLE order_items (
                id UUID PRIMARY KEY,
                order_id UUID NOT NULL REFERENCES orders,
                food_id UUID NOT NULL,
                quantity INT NOT NULL CHECK (quantity > 0),
                price_at_purchase NUMERIC(12, 2) NOT NULL CHECK (price_at_purchase > 0)
            )"#,
            r#"CREATE INDEX order_item_order ON order_items (order_id)"#,
            // kind: 0 = credit, 1 = debit; cause: 0 = topup, 1 = order payment, 2 = adjustment
            r#"
            CREATE TABLE ledger_entries (
                id UUID PRIMARY KEY,
                wallet_id UUID NOT NULL REFERENCES wallets,
                kind INT NOT NULL,
                cause INT NOT NULL,
                amount NUMERIC(12, 2) NOT NULL CHECK (amount > 0),
                created TIMESTAMP WITH TIME ZONE NOT NULL,
                topup_id UUID REFERENCES topups,
                order_id UUID REFERENCES orders,
                note TEXT NOT NULL,
                CHECK ((cause = 0) = (topup_id IS NOT NULL)),
                CHECK ((cause = 1) = (order_id IS NOT NULL))
            )"#,
            r#"CREATE INDEX ledger_entry_wallet_created ON ledger_entries (wallet_id, created)"#,
            r#"CREATE UNIQUE INDEX ledger_entry_topup ON ledger_entries (topup_id)"#,
            r#"CREATE UNIQUE INDEX ledger_entry_order_payment ON ledger_entries (order_id) WHERE cause = 1"#,
        ],
    }
}
