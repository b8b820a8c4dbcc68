use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use rendergraph::Playback;
use shadertoy::is_bundle_path;

/// Frames recorded when `--record` is given without `--frames` or `--duration`.
pub const DEFAULT_RECORD_FRAMES: u32 = 100;

#[derive(Parser, Debug)]
#[command(
    name = "toyshader",
    author,
    version,
    about = "Play multi-pass Shadertoy shaders in a window",
    override_usage = "toyshader [OPTIONS] (--id SHADERID | BUNDLE.json | SHADER.glsl...)"
)]
pub struct Args {
    /// Load the given shader from Shadertoy.com.
    #[arg(long, value_name = "SHADERID")]
    pub id: Option<String>,

    /// Shadertoy.com API key, needed with `--id` and for remote media.
    #[arg(long, env = "SHADERTOY_API_KEY", value_name = "KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Initial window size in points.
    #[arg(long, value_name = "WxH", value_parser = parse_geometry, default_value = "640x360")]
    pub geometry: (u32, u32),

    /// Speed up playback by this factor.
    #[arg(long, value_name = "FACTOR", value_parser = parse_positive, default_value = "1")]
    pub speedup: f64,

    /// Record COUNT frames to PNG.
    #[arg(long, value_name = "COUNT")]
    pub frames: Option<u32>,

    /// Record TIME seconds of playback to PNG.
    #[arg(long, value_name = "TIME", value_parser = parse_positive)]
    pub duration: Option<f64>,

    /// Target frame rate for recording.
    #[arg(long, value_name = "FPS", value_parser = parse_positive, default_value = "60")]
    pub fps: f64,

    /// Starting value of iTime in seconds.
    #[arg(long, value_name = "TIME", value_parser = parse_positive)]
    pub starttime: Option<f64>,

    /// Start out paused.
    #[arg(long)]
    pub paused: bool,

    /// Record frames to PNG from the first frame.
    #[arg(long)]
    pub record: bool,

    /// Feed the keyboard texture to this channel of the image pass.
    #[arg(long, value_name = "CHANNEL", value_parser = clap::value_parser!(u8).range(0..4))]
    pub keyboard: Option<u8>,

    /// Directory screenshots and recorded frames are written to.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// One JSON bundle, or one or more GLSL files.
    #[arg(value_name = "INPUT")]
    pub inputs: Vec<PathBuf>,
}

pub fn parse() -> Args {
    Args::parse()
}

/// Where the shader comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ShaderInput {
    Remote(String),
    Files(Vec<PathBuf>),
}

/// Validated command line.
#[derive(Debug, Clone)]
pub struct Settings {
    pub input: ShaderInput,
    pub api_key: Option<String>,
    pub window_size: (u32, u32),
    pub playback: Playback,
    pub record_frames: Option<u32>,
    pub keyboard: Option<usize>,
    pub output_dir: PathBuf,
}

impl Args {
    pub fn into_settings(self) -> Result<Settings> {
        let input = match self.id {
            Some(id) => {
                if !self.inputs.is_empty() {
                    bail!("can't specify a Shadertoy id and GLSL source");
                }
                if self.api_key.as_deref().map_or(true, |key| key.trim().is_empty()) {
                    bail!("--id needs a Shadertoy API key (--api-key or SHADERTOY_API_KEY)");
                }
                ShaderInput::Remote(id)
            }
            None => {
                if self.inputs.is_empty() {
                    bail!("no shader given; pass --id, a JSON bundle, or GLSL files");
                }
                let bundles = self.inputs.iter().filter(|path| is_bundle_path(path)).count();
                if bundles > 0 && self.inputs.len() > 1 {
                    bail!("can't specify more than one JSON input, or mix JSON with GLSL");
                }
                ShaderInput::Files(self.inputs)
            }
        };

        let frame_period = 1.0 / self.fps;
        let recording = self.record || self.frames.is_some() || self.duration.is_some();
        let record_frames = recording.then(|| match self.duration {
            Some(duration) => (duration / (frame_period * self.speedup)).floor() as u32,
            None => self.frames.unwrap_or(DEFAULT_RECORD_FRAMES),
        });

        Ok(Settings {
            input,
            api_key: self.api_key,
            window_size: self.geometry,
            playback: Playback {
                speedup: self.speedup,
                start_time: self.starttime.unwrap_or(0.0),
                frame_period,
                animating: !self.paused,
                recording,
            },
            record_frames,
            keyboard: self.keyboard.map(usize::from),
            output_dir: self.output_dir,
        })
    }
}

pub fn parse_geometry(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("bad geometry '{value}'; expected WIDTHxHEIGHT"))?;
    let parse = |part: &str| -> Result<u32, String> {
        match part.parse::<u32>() {
            Ok(0) | Err(_) => Err(format!("bad geometry '{value}'; expected WIDTHxHEIGHT")),
            Ok(size) => Ok(size),
        }
    };
    Ok((parse(width)?, parse(height)?))
}

pub fn parse_positive(value: &str) -> Result<f64, String> {
    let number: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("expected a number, got '{value}'"))?;
    if !number.is_finite() || number <= 0.0 {
        return Err(format!("expected a positive number, got '{value}'"));
    }
    Ok(number)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(args: &[&str]) -> Result<Settings> {
        let mut argv = vec!["toyshader"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).map_err(anyhow::Error::from)?.into_settings()
    }

    #[test]
    fn defaults_match_the_player() {
        let settings = settings(&["shader.glsl"]).unwrap();
        assert_eq!(settings.window_size, (640, 360));
        assert_eq!(settings.playback.speedup, 1.0);
        assert!((settings.playback.frame_period - 1.0 / 60.0).abs() < 1e-12);
        assert!(settings.playback.animating);
        assert!(!settings.playback.recording);
        assert_eq!(settings.record_frames, None);
        assert_eq!(settings.input, ShaderInput::Files(vec![PathBuf::from("shader.glsl")]));
    }

    #[test]
    fn duration_converts_to_frames() {
        let settings = settings(&["--duration", "2", "--fps", "30", "--speedup", "2", "a.glsl"]).unwrap();
        assert!(settings.playback.recording);
        assert_eq!(settings.record_frames, Some(30));
    }

    #[test]
    fn record_without_count_uses_default() {
        let settings = settings(&["--record", "a.glsl"]).unwrap();
        assert_eq!(settings.record_frames, Some(DEFAULT_RECORD_FRAMES));
        let settings = self::settings(&["--frames", "7", "a.glsl"]).unwrap();
        assert_eq!(settings.record_frames, Some(7));
    }

    #[test]
    fn geometry_parses_and_rejects() {
        assert_eq!(parse_geometry("800x600").unwrap(), (800, 600));
        assert_eq!(parse_geometry("12X34").unwrap(), (12, 34));
        assert!(parse_geometry("800").is_err());
        assert!(parse_geometry("0x600").is_err());
        assert!(parse_geometry("800x600x2").is_err());
    }

    #[test]
    fn non_positive_numbers_are_rejected() {
        assert!(parse_positive("0").is_err());
        assert!(parse_positive("-2").is_err());
        assert!(parse_positive("abc").is_err());
        assert_eq!(parse_positive("2.5").unwrap(), 2.5);
    }

    #[test]
    fn invalid_input_combinations_fail() {
        assert!(settings(&["--id", "XsBSRG", "--api-key", "k", "a.glsl"]).is_err());
        assert!(settings(&["a.json", "b.json"]).is_err());
        assert!(settings(&["a.json", "b.glsl"]).is_err());
        assert!(settings(&["--keyboard", "4", "a.glsl"]).is_err());
        assert!(settings(&[]).is_err());
    }

    #[test]
    fn remote_id_requires_a_key() {
        assert!(settings(&["--id", "XsBSRG", "--api-key", " "]).is_err());
        let remote = settings(&["--id", "XsBSRG", "--api-key", "k"]).unwrap();
        assert_eq!(remote.input, ShaderInput::Remote("XsBSRG".into()));
    }
}
