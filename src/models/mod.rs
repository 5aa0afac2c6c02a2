mod check_in;
mod flour_ration;
mod image;
mod meal;
mod measurement;
mod starter;
mod timeline;
mod water_ration;

pub use check_in::StarterCheckIn;
pub use flour_ration::FlourRation;
pub use image::Image;
pub use meal::StarterMeal;
pub use measurement::{Mass, MassUnit, Temperature, TemperatureUnit};
pub use starter::Starter;
pub use timeline::{merge_by_date, TimelineEntry};
pub use water_ration::WaterRation;
