use anyhow::{Context, Result};
use std::path::Path;
use tokio::process::Command;

/// Every clip is normalized to this vertical frame.
pub const FRAME_WIDTH: i32 = 1080;
pub const FRAME_HEIGHT: i32 = 1920;
pub const FRAME_RATE: i32 = 30;

/// 9:16 as a width/height ratio.
pub const VERTICAL_RATIO: f64 = 0.5625;

async fn run_cmd(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }

    let status = cmd.status().await.context("Command execution failed")?;
    if !status.success() {
        return Err(anyhow::anyhow!("Command failed: {:?}", args));
    }

    Ok(())
}

pub async fn ffprobe_video_dimensions(path: &Path) -> Result<(i32, i32)> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=s=x:p=0",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe execution failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed"));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let mut parts = text.split('x');
    let w = parts
        .next()
        .and_then(|v| v.parse::<i32>().ok())
        .unwrap_or(0);
    let h = parts
        .next()
        .and_then(|v| v.parse::<i32>().ok())
        .unwrap_or(0);

    if w <= 0 || h <= 0 {
        return Err(anyhow::anyhow!("Invalid dimensions"));
    }

    Ok((w, h))
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed"));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= 0.1 {
        return Err(anyhow::anyhow!("Invalid duration"));
    }
    Ok(duration)
}

/// Centered crop rectangle bringing `(width, height)` to a 9:16 frame.
/// Footage narrower than 9:16 loses height; everything else loses width.
/// Never letterboxes.
pub fn crop_rect(width: i32, height: i32) -> (i32, i32, i32, i32) {
    let ratio = ((width as f64 / height as f64) * 10_000.0).round() / 10_000.0;

    let (crop_w, crop_h) = if ratio < VERTICAL_RATIO {
        (width, (width as f64 / VERTICAL_RATIO).round() as i32)
    } else {
        ((VERTICAL_RATIO * height as f64).round() as i32, height)
    };

    let x = (width - crop_w) / 2;
    let y = (height - crop_h) / 2;
    (crop_w, crop_h, x, y)
}

/// Cuts `take_secs` from the start of a clip, strips its audio and
/// normalizes it to the 1080x1920 30 fps frame.
pub async fn ffmpeg_extract_segment(
    input: &Path,
    take_secs: f64,
    crop: (i32, i32, i32, i32),
    threads: u32,
    out_mp4: &Path,
) -> Result<()> {
    let (crop_w, crop_h, x, y) = crop;
    let filter = format!(
        "crop={crop_w}:{crop_h}:{x}:{y},scale={FRAME_WIDTH}:{FRAME_HEIGHT}"
    );

    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        input.display().to_string(),
        "-t".to_string(),
        format!("{:.3}", take_secs),
        "-an".to_string(),
        "-vf".to_string(),
        filter,
        "-r".to_string(),
        FRAME_RATE.to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-threads".to_string(),
        threads.to_string(),
        out_mp4.display().to_string(),
    ];
    run_cmd(&args).await
}

pub async fn ffmpeg_concat_videos(list_txt: &Path, threads: u32, out_mp4: &Path) -> Result<()> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list_txt.display().to_string(),
        "-r".to_string(),
        FRAME_RATE.to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-threads".to_string(),
        threads.to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out_mp4.display().to_string(),
    ];
    run_cmd(&args).await
}

pub async fn ffmpeg_concat_audio(list_txt: &Path, out_audio: &Path) -> Result<()> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list_txt.display().to_string(),
        "-c".to_string(),
        "copy".to_string(),
        out_audio.display().to_string(),
    ];
    run_cmd(&args).await
}

/// SSA numpad alignment for a "horizontal,vertical" position string.
/// Unrecognized components default to center.
pub fn ass_alignment(position: &str) -> u8 {
    let (horizontal, vertical) = match position.split_once(',') {
        Some((h, v)) => (h.trim(), v.trim()),
        None => (position.trim(), "center"),
    };

    let column = match horizontal {
        "left" => 1,
        "right" => 3,
        _ => 2,
    };
    let row = match vertical {
        "bottom" => 0,
        "top" => 6,
        _ => 3,
    };
    column + row
}

/// `#RRGGBB` to the ASS `&H00BBGGRR` form. Anything unparsable falls back
/// to yellow, the pipeline default.
pub fn ass_color(hex: &str) -> String {
    let digits = hex.trim_start_matches('#');
    let parsed = if digits.len() == 6 {
        u32::from_str_radix(digits, 16).ok()
    } else {
        None
    };

    match parsed {
        Some(rgb) => {
            let r = (rgb >> 16) & 0xFF;
            let g = (rgb >> 8) & 0xFF;
            let b = rgb & 0xFF;
            format!("&H00{:02X}{:02X}{:02X}", b, g, r)
        }
        None => "&H0000FFFF".to_string(),
    }
}

fn subtitle_style(position: &str, color: &str) -> String {
    format!(
        "FontSize=100,Bold=1,PrimaryColour={},OutlineColour=&H00000000,BorderStyle=1,Outline=5,Alignment={}",
        ass_color(color),
        ass_alignment(position)
    )
}

/// Composites captions and the narration track onto the combined video.
/// The video is looped and cut to the narration duration, never the
/// reverse.
pub async fn ffmpeg_render_final(
    combined_video: &Path,
    narration: &Path,
    subtitles: Option<&Path>,
    narration_duration: f64,
    threads: u32,
    position: &str,
    color: &str,
    out_mp4: &Path,
) -> Result<()> {
    let mut args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-stream_loop".to_string(),
        "-1".to_string(),
        "-i".to_string(),
        combined_video.display().to_string(),
        "-i".to_string(),
        narration.display().to_string(),
    ];

    if let Some(subtitles) = subtitles {
        args.push("-vf".to_string());
        args.push(format!(
            "subtitles={}:force_style='{}'",
            subtitles.display(),
            subtitle_style(position, color)
        ));
    }

    args.extend([
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "1:a".to_string(),
        "-t".to_string(),
        format!("{:.3}", narration_duration),
        "-r".to_string(),
        FRAME_RATE.to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-threads".to_string(),
        threads.to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out_mp4.display().to_string(),
    ]);

    run_cmd(&args).await
}

/// Mixes the song under the untouched narration at 10% volume. `amix`
/// normalizes inputs unless told otherwise, which would also attenuate the
/// narration.
pub async fn ffmpeg_mix_music(
    video_in: &Path,
    song_in: &Path,
    original_duration: f64,
    threads: u32,
    video_out: &Path,
) -> Result<()> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        video_in.display().to_string(),
        "-stream_loop".to_string(),
        "-1".to_string(),
        "-i".to_string(),
        song_in.display().to_string(),
        "-filter_complex".to_string(),
        "[1:a]volume=0.1[bgm];[0:a][bgm]amix=inputs=2:duration=first:dropout_transition=2:normalize=0[a]"
            .to_string(),
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "[a]".to_string(),
        "-t".to_string(),
        format!("{:.3}", original_duration),
        "-r".to_string(),
        FRAME_RATE.to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-threads".to_string(),
        threads.to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        video_out.display().to_string(),
    ];
    run_cmd(&args).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aspect(crop: (i32, i32, i32, i32)) -> f64 {
        crop.0 as f64 / crop.1 as f64
    }

    #[test]
    fn wide_footage_is_cropped_to_vertical() {
        let crop = crop_rect(1920, 1080);
        assert_eq!(crop, (608, 1080, 656, 0));
        assert!((aspect(crop) - VERTICAL_RATIO).abs() < 0.001);
    }

    #[test]
    fn narrow_footage_loses_height_instead() {
        let crop = crop_rect(500, 1920);
        let (crop_w, crop_h, x, y) = crop;
        assert_eq!(crop_w, 500);
        assert_eq!(crop_h, (500.0_f64 / VERTICAL_RATIO).round() as i32);
        assert_eq!(x, 0);
        assert_eq!(y, (1920 - crop_h) / 2);
        assert!((aspect(crop) - VERTICAL_RATIO).abs() < 0.001);
    }

    #[test]
    fn exact_vertical_footage_keeps_full_frame() {
        let crop = crop_rect(1080, 1920);
        assert_eq!(crop, (1080, 1920, 0, 0));
    }

    #[test]
    fn crop_is_centered() {
        let (crop_w, _, x, _) = crop_rect(3840, 2160);
        assert_eq!(x, (3840 - crop_w) / 2);
    }

    #[test]
    fn alignment_maps_position_strings() {
        assert_eq!(ass_alignment("left,bottom"), 1);
        assert_eq!(ass_alignment("center,bottom"), 2);
        assert_eq!(ass_alignment("right,bottom"), 3);
        assert_eq!(ass_alignment("center,center"), 5);
        assert_eq!(ass_alignment("left,top"), 7);
        assert_eq!(ass_alignment("right,top"), 9);
        assert_eq!(ass_alignment("garbage"), 5);
    }

    #[test]
    fn color_converts_to_ass_byte_order() {
        assert_eq!(ass_color("#FFFF00"), "&H0000FFFF");
        assert_eq!(ass_color("#FF0000"), "&H000000FF");
        assert_eq!(ass_color("#0000FF"), "&H00FF0000");
        assert_eq!(ass_color("not a color"), "&H0000FFFF");
    }
}
