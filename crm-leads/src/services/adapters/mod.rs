pub mod tenant_table;

pub use tenant_table::{Keyed, TableGuard, TableView, TenantTable};
