//! 画像の特徴量抽出と照合
//!
//! グレースケール化・縮小した画像から FAST コーナーを検出し、
//! 256bit のバイナリ記述子を計算する。距離はハミング距離（0〜256）。

mod brief;
mod fast;
mod matching;

pub use brief::{hamming, Descriptor, DESCRIPTOR_BITS};
pub use fast::Keypoint;
pub use matching::{match_cross_checked, match_knn2};

use crate::error::{Result, SceneSyncError};
use image::imageops::FilterType;
use image::GrayImage;
use rayon::prelude::*;
use scene_sync_common::{FeatureMatcher, Item, MatchKind, Observations};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// 記述子計算前の平滑化（ガウシアンのσ）
const SMOOTHING_SIGMA: f32 = 2.0;

/// 特徴量抽出のパラメータ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractParams {
    /// 1枚あたりの最大特徴点数
    pub max_features: usize,
    /// 縮小後の長辺の最大画素数
    pub max_image_size: u32,
    /// FAST の輝度差閾値
    pub fast_threshold: u8,
}

impl Default for ExtractParams {
    fn default() -> Self {
        Self {
            max_features: 500,
            max_image_size: 1024,
            fast_threshold: 20,
        }
    }
}

/// 1枚分の特徴点と記述子
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorSet {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl DescriptorSet {
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// 画像を読み込みグレースケールにする（長辺が max_size を超えれば縮小）
pub fn load_gray(path: &Path, max_size: u32) -> Result<GrayImage> {
    let image = image::open(path)?;
    let image = if max_size > 0 && image.width().max(image.height()) > max_size {
        image.resize(max_size, max_size, FilterType::Triangle)
    } else {
        image
    };
    Ok(image.to_luma8())
}

/// グレースケール画像から特徴量を抽出（特徴点がなければ None）
pub fn extract_from_gray(image: &GrayImage, params: &ExtractParams) -> Option<DescriptorSet> {
    let margin = brief::PATCH_RADIUS as u32 + 1;
    let keypoints = fast::detect(image, params.fast_threshold, margin, params.max_features);
    if keypoints.is_empty() {
        return None;
    }

    let smoothed = image::imageops::blur(image, SMOOTHING_SIGMA);
    let descriptors = brief::describe(&smoothed, &keypoints);
    Some(DescriptorSet {
        keypoints,
        descriptors,
    })
}

/// 画像ファイルから特徴量を抽出
pub fn extract_from_path(path: &Path, params: &ExtractParams) -> Result<Option<DescriptorSet>> {
    let gray = load_gray(path, params.max_image_size)?;
    Ok(extract_from_gray(&gray, params))
}

/// タイムアウト付きで抽出する
///
/// 時間内に終わらなければ Timeout を返す。抽出スレッドはそのまま捨てる。
pub fn extract_with_timeout(
    path: &Path,
    params: &ExtractParams,
    timeout: Option<Duration>,
) -> Result<Option<DescriptorSet>> {
    let Some(timeout) = timeout else {
        return extract_from_path(path, params);
    };

    let (tx, rx) = mpsc::channel();
    let owned_path = path.to_path_buf();
    let params = *params;
    std::thread::spawn(move || {
        let _ = tx.send(extract_from_path(&owned_path, &params));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(SceneSyncError::Timeout {
            path: path.display().to_string(),
            seconds: timeout.as_secs(),
        }),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(SceneSyncError::Extraction(format!(
            "抽出スレッドが異常終了しました: {}",
            path.display()
        ))),
    }
}

/// 抽出結果のキャッシュ値（失敗は理由の文字列）
type Cached = std::result::Result<Option<Arc<DescriptorSet>>, String>;

/// 画像ファイル用の特徴量マッチャー
///
/// 1回の実行中、画像ごとの抽出結果（失敗を含む）を使い回す。
pub struct ImageMatcher {
    params: ExtractParams,
    timeout: Option<Duration>,
    cache: RwLock<HashMap<PathBuf, Cached>>,
}

impl ImageMatcher {
    pub fn new(params: ExtractParams, timeout: Option<Duration>) -> Self {
        Self {
            params,
            timeout,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn params(&self) -> &ExtractParams {
        &self.params
    }

    /// 画像の特徴量を並列に抽出してキャッシュする
    pub fn warm(&self, items: &[Item]) {
        let computed: Vec<(PathBuf, Cached)> = items
            .par_iter()
            .filter(|item| !self.is_cached(&item.path))
            .map(|item| (item.path.clone(), self.compute(item)))
            .collect();

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.extend(computed);
    }

    /// キャッシュ済みの画像数
    pub fn cached_len(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn is_cached(&self, path: &Path) -> bool {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }

    fn compute(&self, item: &Item) -> Cached {
        match extract_with_timeout(&item.path, &self.params, self.timeout) {
            Ok(Some(set)) => {
                debug!(item = %item.id, features = set.len(), "extracted");
                Ok(Some(Arc::new(set)))
            }
            Ok(None) => {
                debug!(item = %item.id, "no keypoints");
                Ok(None)
            }
            Err(e) => {
                warn!(item = %item.id, error = %e, "extraction failed");
                Err(e.to_string())
            }
        }
    }
}

impl FeatureMatcher for ImageMatcher {
    type Descriptors = Arc<DescriptorSet>;

    fn extract(&self, item: &Item) -> scene_sync_common::Result<Option<Arc<DescriptorSet>>> {
        let cached = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&item.path)
            .cloned();

        let entry = match cached {
            Some(entry) => entry,
            None => {
                let entry = self.compute(item);
                self.cache
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(item.path.clone(), entry.clone());
                entry
            }
        };

        entry.map_err(|reason| scene_sync_common::Error::Extraction {
            item: item.id.clone(),
            reason,
        })
    }

    fn observe(
        &self,
        kind: MatchKind,
        query: &Arc<DescriptorSet>,
        candidate: &Arc<DescriptorSet>,
    ) -> Observations {
        match kind {
            MatchKind::Best => {
                Observations::Best(match_cross_checked(&query.descriptors, &candidate.descriptors))
            }
            MatchKind::Knn2 => {
                Observations::Knn(match_knn2(&query.descriptors, &candidate.descriptors))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// 擬似乱数のブロック模様（シードごとに別の画像）
    fn textured(seed: u32, size: u32) -> GrayImage {
        let mut state = seed.wrapping_mul(2_654_435_761).max(1);
        let mut image = GrayImage::new(size, size);
        for by in 0..size / 8 {
            for bx in 0..size / 8 {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                let value = (state % 256) as u8;
                for y in by * 8..by * 8 + 8 {
                    for x in bx * 8..bx * 8 + 8 {
                        image.put_pixel(x, y, Luma([value]));
                    }
                }
            }
        }
        image
    }

    #[test]
    fn test_flat_image_has_no_descriptors() {
        let image = GrayImage::from_pixel(128, 128, Luma([100]));
        assert!(extract_from_gray(&image, &ExtractParams::default()).is_none());
    }

    #[test]
    fn test_textured_image_has_descriptors() {
        let set = extract_from_gray(&textured(7, 160), &ExtractParams::default()).unwrap();
        assert!(!set.is_empty());
        assert_eq!(set.keypoints.len(), set.descriptors.len());
        assert!(set.len() <= 500);
    }

    #[test]
    fn test_max_features_limit() {
        let params = ExtractParams {
            max_features: 10,
            ..Default::default()
        };
        let set = extract_from_gray(&textured(3, 160), &params).unwrap();
        assert!(set.len() <= 10);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let image = textured(11, 160);
        let a = extract_from_gray(&image, &ExtractParams::default());
        let b = extract_from_gray(&image, &ExtractParams::default());
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = extract_from_path(Path::new("/nonexistent/photo.jpg"), &ExtractParams::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_timeout_branch_returns_descriptors_in_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        textured(5, 160).save(&path).unwrap();

        let set = extract_with_timeout(&path, &ExtractParams::default(), Some(Duration::from_secs(30)))
            .unwrap()
            .unwrap();
        assert_eq!(Some(set), extract_from_path(&path, &ExtractParams::default()).unwrap());
    }

    #[test]
    fn test_expired_timeout_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        textured(5, 160).save(&path).unwrap();

        let result = extract_with_timeout(&path, &ExtractParams::default(), Some(Duration::ZERO));
        assert!(matches!(result, Err(SceneSyncError::Timeout { seconds: 0, .. })));
    }

    #[test]
    fn test_timed_out_candidate_is_skipped() {
        use scene_sync_common::{find_best_match, ScoringPolicy};

        let dir = tempfile::tempdir().unwrap();
        let query = Item::new("film.png", dir.path().join("film.png"));
        let slow = Item::new("slow.png", dir.path().join("slow.png"));
        let good = Item::new("good.png", dir.path().join("good.png"));
        textured(9, 160).save(&query.path).unwrap();
        textured(9, 160).save(&good.path).unwrap();
        textured(21, 160).save(&slow.path).unwrap();

        // 時間切れにならないよう、クエリと一致候補は先に抽出しておく
        let matcher = ImageMatcher::new(ExtractParams::default(), Some(Duration::ZERO));
        for item in [&query, &good] {
            let set = extract_from_path(&item.path, &ExtractParams::default()).unwrap().map(Arc::new);
            matcher.cache.write().unwrap().insert(item.path.clone(), Ok(set));
        }

        let report = find_best_match(
            &matcher,
            &ScoringPolicy::default(),
            &query,
            &[slow.clone(), good.clone()],
        );
        assert_eq!(report.outcome.candidate_id.as_deref(), Some("good.png"));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].item_id, "slow.png");

        assert!(matches!(
            matcher.extract(&slow),
            Err(scene_sync_common::Error::Extraction { .. })
        ));
    }

    #[test]
    fn test_matcher_caches_failures() {
        let matcher = ImageMatcher::new(ExtractParams::default(), None);
        let item = Item::new("missing.jpg", "/nonexistent/missing.jpg");

        assert!(matcher.extract(&item).is_err());
        assert_eq!(matcher.cached_len(), 1);
        assert!(matches!(
            matcher.extract(&item),
            Err(scene_sync_common::Error::Extraction { .. })
        ));
    }
}
