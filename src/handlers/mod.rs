//! Built-in handlers for the business events published on the interop exchange.

mod generic;
mod inventory;
mod notification;
mod order;
mod payment;
mod user_registration;

pub use generic::{GenericHandler, GenericSummary};
pub use inventory::{InventoryHandler, InventoryOperation, InventorySummary};
pub use notification::{NotificationChannel, NotificationHandler, NotificationSummary, Priority};
pub use order::{OrderHandler, OrderSummary};
pub use payment::{format_usd, PaymentHandler, PaymentStatus, PaymentSummary};
pub use user_registration::{RegistrationSummary, UserRegistrationHandler};

pub const USER_REGISTRATION: &str = "USER_REGISTRATION";
pub const ORDER_CREATED: &str = "ORDER_CREATED";
pub const PAYMENT_PROCESSED: &str = "PAYMENT_PROCESSED";
pub const INVENTORY_UPDATE: &str = "INVENTORY_UPDATE";
pub const NOTIFICATION_SEND: &str = "NOTIFICATION_SEND";
