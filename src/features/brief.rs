//! 256bitバイナリ記述子
//!
//! 平滑化した画像上で、特徴点まわり31x31の固定パターンの画素対を比較する。

use super::fast::Keypoint;
use image::GrayImage;
use lazy_static::lazy_static;

/// 記述子のビット数
pub const DESCRIPTOR_BITS: usize = 256;

/// パッチ半径（31x31）
pub const PATCH_RADIUS: i32 = 15;

/// 256bit記述子
pub type Descriptor = [u64; 4];

lazy_static! {
    /// 画素対のサンプリングパターン（固定シードの擬似乱数）
    static ref PATTERN: Vec<(i32, i32, i32, i32)> = build_pattern(0x5EED_5CE4_E5E1_0001);
}

fn build_pattern(seed: u64) -> Vec<(i32, i32, i32, i32)> {
    let mut state = seed;
    let span = (PATCH_RADIUS * 2 + 1) as u64;
    let mut next = move || {
        // xorshift64
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state % span) as i32 - PATCH_RADIUS
    };
    (0..DESCRIPTOR_BITS)
        .map(|_| (next(), next(), next(), next()))
        .collect()
}

/// 特徴点ごとに記述子を計算する
///
/// `smoothed` は平滑化済みの画像。パッチがはみ出す特徴点は呼び出し側で除外しておく。
pub fn describe(smoothed: &GrayImage, keypoints: &[Keypoint]) -> Vec<Descriptor> {
    let stride = smoothed.width() as usize;
    let pixels = smoothed.as_raw();
    let at = |x: i32, y: i32| pixels[y as usize * stride + x as usize];

    keypoints
        .iter()
        .map(|kp| {
            let (cx, cy) = (kp.x as i32, kp.y as i32);
            let mut descriptor: Descriptor = [0; 4];
            for (bit, &(x1, y1, x2, y2)) in PATTERN.iter().enumerate() {
                if at(cx + x1, cy + y1) < at(cx + x2, cy + y2) {
                    descriptor[bit / 64] |= 1 << (bit % 64);
                }
            }
            descriptor
        })
        .collect()
}

/// ハミング距離（0〜256）
pub fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}
