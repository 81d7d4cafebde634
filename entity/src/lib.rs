pub mod billing_transaction;
pub mod toll_zone;

pub mod prelude {
    pub use super::billing_transaction::{
        Entity as BillingTransaction, Model as BillingTransactionModel, TransactionStatus,
    };
    pub use super::toll_zone::{Entity as TollZone, Model as TollZoneModel};
}
