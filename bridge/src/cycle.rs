use crate::metrics::READ_FAILURES_TOTAL;
use crate::model::{CycleResult, Device, DeviceReading};
use crate::publisher::{format_message, Publisher};
use crate::reader::DeviceSource;
use crate::session::Session;
use async_trait::async_trait;
use tracing::{error, info, warn};

#[async_trait]
pub trait Cycle: Send + Sync {
    async fn run_cycle(&self, session: &Session) -> CycleResult;
}

/// One pass: read MILL_2, read MILL_1, publish both.
///
/// The cycle succeeds when both devices produced a non-blank value. A publish
/// failure is logged but leaves the cycle successful, since it says nothing
/// about the portal session.
pub struct CycleController<R, P> {
    reader: R,
    publisher: P,
    mill_1: Device,
    mill_2: Device,
}

impl<R, P> CycleController<R, P>
where
    R: DeviceSource,
    P: Publisher,
{
    pub fn new(reader: R, publisher: P, mill_1: Device, mill_2: Device) -> Self {
        Self {
            reader,
            publisher,
            mill_1,
            mill_2,
        }
    }

    async fn read(&self, session: &Session, device: &Device) -> Option<DeviceReading> {
        match self.reader.read(session, device).await {
            Ok(reading) if reading.is_present() => Some(reading),
            Ok(reading) => {
                READ_FAILURES_TOTAL.inc();
                warn!(
                    "{} returned an empty value for {}",
                    device.label, reading.parameter
                );
                None
            }
            // already logged by the reader
            Err(_) => None,
        }
    }
}

#[async_trait]
impl<R, P> Cycle for CycleController<R, P>
where
    R: DeviceSource,
    P: Publisher,
{
    async fn run_cycle(&self, session: &Session) -> CycleResult {
        let mill_2 = self.read(session, &self.mill_2).await;
        let mill_1 = self.read(session, &self.mill_1).await;

        let message = match (&mill_1, &mill_2) {
            (Some(one), Some(two)) => Some(format_message(&one.value, &two.value)),
            _ => None,
        };
        let Some(message) = message else {
            error!("Could not scrape data for one or both devices");
            info!(
                "Debug responses are saved as debug_{}_ajax.json and debug_{}_ajax.json",
                self.mill_1.label, self.mill_2.label
            );
            return CycleResult::failed(mill_1, mill_2);
        };

        let published = self.publisher.publish(&message).await.is_ok();

        CycleResult {
            success: true,
            mill_1,
            mill_2,
            published,
        }
    }
}
