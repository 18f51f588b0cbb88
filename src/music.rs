use anyhow::{Context, Result};
use rand::{Rng, SeedableRng};
use reqwest::Client;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tracing::info;

pub const SONGS_DIR: &str = "songs";

/// Fallback archive of popular background tracks, used when a generation
/// asks for music without supplying its own zip.
pub const DEFAULT_SONGS_ZIP_URL: &str =
    "https://filebin.net/2avx134kdibc4c3q/drive-download-20240209T180019Z-001.zip";

fn now_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

async fn list_songs() -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let dir = Path::new(SONGS_DIR);
    if fs::metadata(dir).await.map(|m| m.is_dir()).unwrap_or(false) {
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_mp3 = path
                .extension()
                .and_then(OsStr::to_str)
                .map(|ext| ext.eq_ignore_ascii_case("mp3"))
                .unwrap_or(false);
            if path.is_file() && is_mp3 {
                out.push(path);
            }
        }
    }
    Ok(out)
}

/// Downloads and extracts the songs archive. Skipped when the songs
/// directory is already populated.
pub async fn fetch_songs(client: &Client, zip_url: &str) -> Result<()> {
    if !list_songs().await?.is_empty() {
        info!("Songs already present, skipping download");
        return Ok(());
    }
    fs::create_dir_all(SONGS_DIR).await?;

    info!("Downloading songs archive: {}", zip_url);
    let zip_bytes = client
        .get(zip_url)
        .timeout(std::time::Duration::from_secs(300))
        .send()
        .await
        .context("Songs archive request failed")?
        .error_for_status()
        .context("Songs archive download rejected")?
        .bytes()
        .await?;

    let tmpzip_path = Path::new(SONGS_DIR).join("_songs_tmp.zip");
    fs::write(&tmpzip_path, &zip_bytes).await?;

    let extracted = extract_songs_from_zip(&tmpzip_path).await?;
    let _ = fs::remove_file(&tmpzip_path).await;

    if extracted == 0 {
        anyhow::bail!("Songs archive contained no mp3 files");
    }
    info!("Extracted {} songs", extracted);
    Ok(())
}

async fn extract_songs_from_zip(tmpzip_path: &Path) -> Result<usize> {
    let tmpzip_path = tmpzip_path.to_owned();

    tokio::task::spawn_blocking(move || -> Result<usize> {
        let file = std::fs::File::open(&tmpzip_path)
            .with_context(|| format!("open zip: {}", tmpzip_path.display()))?;
        let mut archive = zip::ZipArchive::new(file).context("read zip archive")?;

        let mut extracted = 0;
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).context("read zip entry")?;
            if entry.is_dir() {
                continue;
            }

            let name = entry.name().to_string();
            if !name.to_ascii_lowercase().ends_with(".mp3") {
                continue;
            }

            // Flatten: archives often nest songs inside a folder.
            let file_name = Path::new(&name)
                .file_name()
                .and_then(OsStr::to_str)
                .unwrap_or(&name)
                .to_string();
            let dest = Path::new(SONGS_DIR).join(file_name);

            let mut out = std::fs::File::create(&dest)
                .with_context(|| format!("create song: {}", dest.display()))?;
            std::io::copy(&mut entry, &mut out).context("extract song")?;
            extracted += 1;
        }

        Ok(extracted)
    })
    .await?
}

/// Uniform pick over the extracted songs.
pub async fn choose_random_song() -> Result<PathBuf> {
    let songs = list_songs().await?;
    if songs.is_empty() {
        anyhow::bail!("No songs available in {}", SONGS_DIR);
    }

    let mut rng = rand::rngs::StdRng::seed_from_u64(now_seed());
    let song = songs[rng.gen_range(0..songs.len())].clone();
    info!("Chose song: {}", song.display());
    Ok(song)
}
