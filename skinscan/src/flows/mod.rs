mod history;
mod scan;

pub use history::HistoryFlow;
pub use scan::{AnalysisTicket, RoutePayload, SaveState, ScanFlow, ScanStage};
