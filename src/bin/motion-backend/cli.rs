use clap::{command, Parser};

// Some defaults; some of which can be overriden via CLI args
const CONFIG_FILE_PATH: &str = "./motionConfig.json";

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Where to load the pipeline config
    #[arg(long="configPath",default_value_t=String::from(CONFIG_FILE_PATH))]
    pub config_path: String,

    /// Directory holding the frame sequence; image files are processed in
    /// name order
    #[arg(long = "frames")]
    pub frames_dir: String,

    /// Optional path for per-frame results as JSON
    #[arg(long = "output")]
    pub output_path: Option<String>,

    /// Max centroid distance (px) for the stand-in tracker to keep an ID
    #[arg(long = "tracker.maxMatchDistance", default_value_t = 75.)]
    pub tracker_max_match_distance: f32,

    /// How many frames a stand-in track may go unmatched before its ID expires
    #[arg(long = "tracker.maxMissedFrames", default_value_t = 10)]
    pub tracker_max_missed_frames: u32,

    #[arg(long = "loglevel",default_value_t=String::from("info"))]
    pub log_level: String,
}
