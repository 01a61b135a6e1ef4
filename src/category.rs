//! 肌色カテゴリの参照データと推論結果の解釈

use serde::Serialize;

use crate::types::{PredictionResult, SkinTone, CLASS_NAMES};

/// カテゴリごとの表示用データ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryInfo {
    pub display_name: &'static str,
    pub description: &'static str,
    pub recommendation: &'static str,
}

const LIGHT: CategoryInfo = CategoryInfo {
    display_name: "light",
    description: "Warna kulit cerah cenderung memiliki produksi melanin yang lebih sedikit. \
        Di iklim tropis Indonesia, tipe kulit ini sangat rentan terhadap kerusakan akibat \
        sinar UV seperti kemerahan dan flek hitam.",
    recommendation: "Wajib gunakan tabir surya (sunscreen) minimal SPF 30 PA++ setiap hari, \
        bahkan saat di dalam ruangan. Ulangi pemakaian setiap 2-3 jam. Cari produk dengan \
        kandungan antioksidan seperti Vitamin C untuk melawan radikal bebas dan mencegah \
        kulit kusam.",
};

const MID_LIGHT: CategoryInfo = CategoryInfo {
    display_name: "mid-light",
    description: "Ini adalah warna kulit paling umum di Indonesia, sering disebut kuning \
        langsat. Memiliki keseimbangan melanin yang baik, namun tetap berisiko mengalami \
        kulit kusam dan noda bekas jerawat (PIH) jika tidak dirawat dengan tepat.",
    recommendation: "Gunakan tabir surya minimal SPF 30 untuk perlindungan harian. Untuk \
        menjaga kecerahan, gunakan serum dengan Niacinamide atau Vitamin C. Lakukan \
        eksfoliasi ringan 1-2 kali seminggu dengan produk AHA/BHA untuk mengangkat sel \
        kulit mati.",
};

const DARK: CategoryInfo = CategoryInfo {
    display_name: "dark",
    description: "Warna kulit sawo matang atau gelap memiliki pesona eksotis dan kaya akan \
        melanin yang memberikan perlindungan alami lebih baik dari matahari. Namun, sangat \
        rentan membentuk noda hitam atau bekas luka yang menggelap (hiperpigmentasi).",
    recommendation: "Fokus utama adalah hidrasi dan meratakan warna kulit. Gunakan pelembap \
        dengan Hyaluronic Acid atau Ceramide. Untuk mengatasi noda hitam, cari bahan aktif \
        seperti Niacinamide, Alpha Arbutin, atau Azelaic Acid. Tetap gunakan tabir surya \
        untuk mencegah noda semakin gelap.",
};

/// 結果表示の下に出す注意書き
pub const DISCLAIMER: &str = "Hasil analisis ini adalah prediksi berdasarkan model AI dan \
    tidak menggantikan konsultasi dengan dokter kulit profesional.";

impl CategoryInfo {
    pub fn of(tone: SkinTone) -> &'static CategoryInfo {
        match tone {
            SkinTone::Dark => &DARK,
            SkinTone::Light => &LIGHT,
            SkinTone::MidLight => &MID_LIGHT,
        }
    }

    /// ラベル文字列から参照データを取得
    pub fn for_label(label: &str) -> Option<&'static CategoryInfo> {
        SkinTone::from_label(label).map(Self::of)
    }
}

/// 推論結果をカテゴリに解決したもの
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CategoryResolution {
    pub tone: SkinTone,
    pub label: &'static str,
    pub confidence_percent: f32,
    pub info: &'static CategoryInfo,
}

impl CategoryResolution {
    /// 小数点以下2桁の表示（例: "70.00%"）
    pub fn confidence_display(&self) -> String {
        format!("{:.2}%", self.confidence_percent)
    }
}

/// 推論結果から最尤カテゴリ・信頼度・参照データを取得
///
/// 信頼度の下限は設けていません。低い値もそのまま表示用に返します。
pub fn resolve_category(prediction: &PredictionResult) -> CategoryResolution {
    let index = prediction.argmax();
    let label = CLASS_NAMES[index];
    let tone = SkinTone::from_label(label)
        .expect("CLASS_NAMES と SkinTone の対応が壊れています");

    CategoryResolution {
        tone,
        label,
        confidence_percent: prediction.confidence_percent(),
        info: CategoryInfo::of(tone),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_label_has_info() {
        for label in CLASS_NAMES {
            let info = CategoryInfo::for_label(label).unwrap();
            assert_eq!(info.display_name, label);
            assert!(!info.description.is_empty());
            assert!(!info.recommendation.is_empty());
        }
    }

    #[test]
    fn test_resolve_light() {
        let resolution = resolve_category(&PredictionResult::new([0.1, 0.7, 0.2]));
        assert_eq!(resolution.tone, SkinTone::Light);
        assert_eq!(resolution.label, "light");
        assert_eq!(resolution.confidence_display(), "70.00%");
        assert_eq!(resolution.info.display_name, "light");
    }

    #[test]
    fn test_resolve_tie_is_dark() {
        let resolution = resolve_category(&PredictionResult::new([0.5, 0.5, 0.0]));
        assert_eq!(resolution.label, "dark");
        assert_eq!(resolution.confidence_display(), "50.00%");
    }

    #[test]
    fn test_resolve_always_in_label_set() {
        let samples = [
            [1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.33, 0.33, 0.34],
            [0.0, 0.0, 0.0],
            [0.2, 0.5, 0.3],
        ];
        for probs in samples {
            let resolution = resolve_category(&PredictionResult::new(probs));
            assert!(CLASS_NAMES.contains(&resolution.label));
            assert_eq!(CategoryInfo::for_label(resolution.label), Some(resolution.info));
        }
    }

    #[test]
    fn test_low_confidence_is_not_rejected() {
        let resolution = resolve_category(&PredictionResult::new([0.34, 0.33, 0.33]));
        assert_eq!(resolution.tone, SkinTone::Dark);
        assert_eq!(resolution.confidence_display(), "34.00%");
    }
}
