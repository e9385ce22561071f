use chrono::prelude::*;
use easy_ext::ext;

#[ext(DateTimeExt)]
pub(crate) impl DateTime<Local> {
    /// Time left until the next local midnight, when the daily counters roll over.
    fn until_next_midnight(&self) -> std::time::Duration {
        let Some(midnight) = self
            .date_naive()
            .succ_opt()
            .and_then(|tomorrow| tomorrow.and_hms_opt(0, 0, 0))
        else {
            return std::time::Duration::ZERO;
        };

        (midnight - self.naive_local())
            .to_std()
            .unwrap_or_default()
    }
}
