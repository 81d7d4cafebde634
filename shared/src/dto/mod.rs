pub mod error_envelope;
pub mod gps_fix;
pub mod payment_result;
pub mod toll_event;

pub use error_envelope::ErrorEnvelope;
pub use gps_fix::GpsFix;
pub use payment_result::{PaymentResult, PaymentStatus};
pub use toll_event::TollEvent;
