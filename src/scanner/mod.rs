use scene_sync_common::Item;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct ImageInfo {
    pub path: PathBuf,
    pub file_name: String,
}

impl ImageInfo {
    pub fn to_item(&self) -> Item {
        Item::new(self.file_name.clone(), self.path.clone())
    }
}

/// 対応する拡張子（小文字で比較）
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif"];

/// フォルダ直下の画像を列挙する
///
/// 存在しないフォルダや空のフォルダは空のリストを返す。
pub fn list_images(folder: &Path) -> Vec<ImageInfo> {
    if !folder.is_dir() {
        return Vec::new();
    }

    let mut images: Vec<ImageInfo> = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)  // 直下のみ（再帰しない）
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_image_file(e.path()))
        .map(|e| ImageInfo {
            path: e.path().to_path_buf(),
            file_name: e.file_name().to_string_lossy().to_string(),
        })
        .collect();

    // ファイル名でソート
    images.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    images
}

/// 画像を照合対象のリストにする
pub fn list_items(folder: &Path) -> Vec<Item> {
    list_images(folder).iter().map(ImageInfo::to_item).collect()
}

/// 画像を1枚以上含むサブフォルダ名の一覧
pub fn list_image_folders(base: &Path) -> Vec<String> {
    if !base.is_dir() {
        return Vec::new();
    }

    let mut folders: Vec<String> = WalkDir::new(base)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .filter(|e| !list_images(e.path()).is_empty())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();

    folders.sort();
    folders
}

/// Check if a path has a supported image extension (case-insensitive)
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}
