use unicode_normalization::UnicodeNormalization as _;

use crate::{configuration::FitConfiguration, fonts::TextMetrics};

/// Starting font sizes by text length: the longer the text, the smaller the seed. Texts
/// at least as long as the last bound start from `LONG_TEXT_SEED`.
const SEED_BUCKETS: [(usize, f32); 5] = [
    (100, 190.0),
    (250, 160.0),
    (500, 130.0),
    (800, 105.0),
    (1200, 85.0),
];
const LONG_TEXT_SEED: f32 = 70.0;

/// Steps smaller than this would never reach the bounds in a reasonable time.
const MINIMUM_STEP: f32 = 0.01;

/// One word of a laid out line, together with its width at the line's font size.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub text: String,
    pub width: f32,
}

/// A line of text as produced by `wrap_lines`.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub words: Vec<Word>,
    /// Width of the space separating two words at the line's font size.
    pub space_width: f32,
    /// Whether the line is the last of its paragraph, such lines are never justified.
    pub ends_paragraph: bool,
}

impl TextLine {
    fn new(space_width: f32) -> Self {
        TextLine {
            words: Vec::new(),
            space_width,
            ends_paragraph: false,
        }
    }

    /// The width of the line when its words are separated by single spaces.
    pub fn natural_width(&self) -> f32 {
        let words_width: f32 = self.words.iter().map(|word| word.width).sum();
        let spaces = self.words.len().saturating_sub(1) as f32;
        words_width + spaces * self.space_width
    }

    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|word| word.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The message laid out at its fitted size, together with the size of the signature below it.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedText {
    pub font_size: f32,
    pub lines: Vec<TextLine>,
    pub signature_font_size: f32,
}

/// Wraps `text` into lines no wider than `box_width` at `font_size`. Hard line breaks are kept,
/// an empty paragraph still takes a line, runs of whitespace collapse into single spaces and
/// words wider than the box are broken between characters.
pub fn wrap_lines(
    metrics: &dyn TextMetrics,
    text: &str,
    font_size: f32,
    box_width: f32,
) -> Vec<TextLine> {
    let normalized_text = text.nfc().collect::<String>();
    wrap_normalized_lines(metrics, &normalized_text, font_size, box_width)
}

fn wrap_normalized_lines(
    metrics: &dyn TextMetrics,
    text: &str,
    font_size: f32,
    box_width: f32,
) -> Vec<TextLine> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let space_width = metrics.advance_width(' ', font_size);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut line = TextLine::new(space_width);

        for word_text in paragraph.split_whitespace() {
            let word_width = text_width(metrics, word_text, font_size);
            let width_with_word = if line.words.is_empty() {
                word_width
            } else {
                line.natural_width() + space_width + word_width
            };

            if width_with_word <= box_width {
                line.words.push(Word {
                    text: word_text.to_string(),
                    width: word_width,
                });
                continue;
            }

            // The word goes to a new line, broken into pieces if it is still too wide
            if !line.words.is_empty() {
                lines.push(std::mem::replace(&mut line, TextLine::new(space_width)));
            }
            let mut pieces = break_word(metrics, word_text, font_size, box_width);
            let last_piece = pieces.pop();
            for piece in pieces {
                let mut piece_line = TextLine::new(space_width);
                piece_line.words.push(piece);
                lines.push(piece_line);
            }
            if let Some(last_piece) = last_piece {
                line.words.push(last_piece);
            }
        }

        line.ends_paragraph = true;
        lines.push(line);
    }

    lines
}

/// Splits a word into pieces fitting the box, each piece holding at least one character.
fn break_word(metrics: &dyn TextMetrics, word: &str, font_size: f32, box_width: f32) -> Vec<Word> {
    let mut pieces = Vec::new();
    let mut piece = Word {
        text: String::new(),
        width: 0.0,
    };

    for character in word.chars() {
        let advance = metrics.advance_width(character, font_size);
        if !piece.text.is_empty() && piece.width + advance > box_width {
            pieces.push(std::mem::replace(
                &mut piece,
                Word {
                    text: String::new(),
                    width: 0.0,
                },
            ));
        }
        piece.text.push(character);
        piece.width += advance;
    }
    if !piece.text.is_empty() {
        pieces.push(piece);
    }

    pieces
}

/// The width of `text` set on a single line, without kerning.
pub fn text_width(metrics: &dyn TextMetrics, text: &str, font_size: f32) -> f32 {
    text.chars()
        .map(|character| metrics.advance_width(character, font_size))
        .sum()
}

/// The height `text` takes once wrapped into a box of `box_width` pixels.
pub fn measure_height(
    metrics: &dyn TextMetrics,
    text: &str,
    font_size: f32,
    box_width: f32,
    line_height: f32,
) -> f32 {
    wrap_lines(metrics, text, font_size, box_width).len() as f32 * font_size * line_height
}

/// The font size the search starts from, only there to save iterations.
pub fn seed_font_size(text_length: usize) -> f32 {
    SEED_BUCKETS
        .iter()
        .find(|(upper_bound, _)| text_length < *upper_bound)
        .map(|(_, seed)| *seed)
        .unwrap_or(LONG_TEXT_SEED)
}

/// Finds the largest font size in the configured bounds at which `text` fits in the container.
///
/// # Arguments
///
/// * `metrics` - The metrics of the typeface the text is set in.
/// * `text` - The text to fit, hard line breaks included.
/// * `container_width` - The width in pixels the text wraps at.
/// * `container_height` - The height in pixels the text must not exceed.
/// * `configuration` - The bounds, steps and iteration limits of the search.
pub fn fit_font_size(
    metrics: &dyn TextMetrics,
    text: &str,
    container_width: f32,
    container_height: f32,
    configuration: &FitConfiguration,
) -> f32 {
    let normalized_text = text.nfc().collect::<String>();
    let seed = seed_font_size(normalized_text.chars().count());
    fit_font_size_with(
        |font_size| {
            wrap_normalized_lines(metrics, &normalized_text, font_size, container_width).len()
                as f32
                * font_size
                * configuration.line_height
        },
        seed,
        container_height,
        configuration,
    )
}

/// The search behind `fit_font_size`, against any height function which grows with the font size.
///
/// The size first grows by large steps while the content fills less than the grow threshold of
/// the container, then shrinks by medium steps while it overflows, and finally by small steps
/// until it fits. Each of the first two phases is capped in iterations, the last one only
/// stops at the minimum size. The size which fits is then settled on the largest multiple of
/// the small step above the minimum size that still fits, so that the seed only changes the
/// number of measurements. If the text overflows even at the minimum size, the minimum size
/// is returned anyway.
pub fn fit_font_size_with(
    mut measure_height: impl FnMut(f32) -> f32,
    seed: f32,
    available_height: f32,
    configuration: &FitConfiguration,
) -> f32 {
    let (min_font_size, max_font_size) = font_size_bounds(configuration);
    let seed = if seed.is_finite() { seed } else { max_font_size };
    let grow_limit = available_height * configuration.grow_threshold;

    let mut font_size = seed.clamp(min_font_size, max_font_size);
    let mut height = measure_height(font_size);
    let mut measurements = 1;

    let grow_step = configuration.grow_step.max(MINIMUM_STEP);
    let mut steps = 0;
    while height < grow_limit && font_size < max_font_size && steps < configuration.max_grow_steps {
        font_size = (font_size + grow_step).min(max_font_size);
        height = measure_height(font_size);
        steps += 1;
    }
    measurements += steps;

    let shrink_step = configuration.shrink_step.max(MINIMUM_STEP);
    steps = 0;
    while height > available_height
        && font_size > min_font_size
        && steps < configuration.max_shrink_steps
    {
        font_size = (font_size - shrink_step).max(min_font_size);
        height = measure_height(font_size);
        steps += 1;
    }
    measurements += steps;

    let fine_step = configuration.fine_step.max(MINIMUM_STEP);
    while height > available_height && font_size > min_font_size {
        font_size = (font_size - fine_step).max(min_font_size);
        height = measure_height(font_size);
        measurements += 1;
    }

    // The phases above land on a grid which depends on the seed, settle on the largest size
    // of the fine grid anchored at the minimum size which still fits
    if height <= available_height {
        let snapped_font_size =
            min_font_size + ((font_size - min_font_size) / fine_step).floor() * fine_step;
        if snapped_font_size < font_size {
            font_size = snapped_font_size;
            height = measure_height(font_size);
            measurements += 1;
        }

        loop {
            let next_font_size = (font_size + fine_step).min(max_font_size);
            if next_font_size <= font_size {
                break;
            }
            let next_height = measure_height(next_font_size);
            measurements += 1;
            if next_height > available_height {
                break;
            }
            font_size = next_font_size;
            height = next_height;
        }
    }

    if height > available_height {
        log::debug!(
            "The text still overflows at the minimum font size {} ({} > {})",
            font_size,
            height,
            available_height
        );
    }
    log::trace!(
        "Fitted font size {} from seed {} after {} measurements",
        font_size,
        seed,
        measurements
    );

    font_size
}

/// Brings `font_size` into the configured bounds, whatever order they were given in.
pub fn clamp_font_size(font_size: f32, configuration: &FitConfiguration) -> f32 {
    let (min_font_size, max_font_size) = font_size_bounds(configuration);
    font_size.clamp(min_font_size, max_font_size)
}

fn font_size_bounds(configuration: &FitConfiguration) -> (f32, f32) {
    let min_font_size = configuration.min_font_size.max(0.0);
    let max_font_size = configuration.max_font_size.max(0.0);
    if min_font_size <= max_font_size {
        (min_font_size, max_font_size)
    } else {
        (max_font_size, min_font_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::UniformMetrics;

    const CONTAINER_WIDTH: f32 = 2100.0;
    const CONTAINER_HEIGHT: f32 = 2970.0;

    fn repeated_words(count: usize) -> String {
        vec!["lorem"; count].join(" ")
    }

    fn fit(text: &str, container_height: f32) -> f32 {
        fit_font_size(
            &UniformMetrics::default(),
            text,
            CONTAINER_WIDTH,
            container_height,
            &FitConfiguration::default(),
        )
    }

    #[test]
    fn seeds_decrease_with_the_text_length() {
        assert_eq!(seed_font_size(0), 190.0);
        assert_eq!(seed_font_size(2), 190.0);
        assert_eq!(seed_font_size(100), 160.0);
        assert_eq!(seed_font_size(499), 130.0);
        assert_eq!(seed_font_size(799), 105.0);
        assert_eq!(seed_font_size(1199), 85.0);
        assert_eq!(seed_font_size(1500), 70.0);
    }

    #[test]
    fn short_texts_grow_up_to_the_maximum() {
        let font_size = fit("Hi", CONTAINER_HEIGHT);
        assert!((190.0..=240.0).contains(&font_size), "{}", font_size);
        assert_eq!(font_size, 240.0);
    }

    #[test]
    fn long_texts_keep_a_small_size() {
        // 250 words of five letters, 1499 characters
        let text = repeated_words(250);
        let font_size = fit(&text, CONTAINER_HEIGHT);
        assert!((55.0..=95.0).contains(&font_size), "{}", font_size);
        // Ten words a line, 25 lines of 71 * 1.6 pixels
        assert_eq!(font_size, 71.0);
    }

    #[test]
    fn overflowing_texts_shrink_until_they_fit() {
        let text = repeated_words(250);
        let font_size = fit(&text, 2000.0);

        assert!((font_size - 59.0).abs() < 1e-3, "{}", font_size);
        let height = measure_height(
            &UniformMetrics::default(),
            &text,
            font_size,
            CONTAINER_WIDTH,
            1.6,
        );
        assert!(height <= 2000.0, "{}", height);
    }

    #[test]
    fn shorter_texts_never_get_smaller_sizes() {
        let sizes: Vec<f32> = [10, 100, 250]
            .iter()
            .map(|count| fit(&repeated_words(*count), CONTAINER_HEIGHT))
            .collect();

        similar_asserts::assert_eq!(sizes, vec![240.0, 109.0, 71.0]);
    }

    #[test]
    fn the_seed_does_not_change_the_fitted_size() {
        let text = repeated_words(144);
        let metrics = UniformMetrics::default();
        let configuration = FitConfiguration::default();
        let height = |font_size: f32| measure_height(&metrics, &text, font_size, CONTAINER_WIDTH, 1.6);

        let fitted_sizes: Vec<f32> = [10.0, 70.0, 85.0, 105.0, 130.0, 190.0, 240.0]
            .into_iter()
            .map(|seed| fit_font_size_with(height, seed, CONTAINER_HEIGHT, &configuration))
            .collect();
        assert!(
            fitted_sizes.windows(2).all(|pair| pair[0] == pair[1]),
            "{:?}",
            fitted_sizes
        );
        assert!(height(fitted_sizes[0]) <= CONTAINER_HEIGHT);
        assert!(height(fitted_sizes[0] + 0.5) > CONTAINER_HEIGHT);
    }

    #[test]
    fn the_minimum_size_is_accepted_when_nothing_fits() {
        let text = repeated_words(2000);
        let font_size = fit(&text, 100.0);
        assert_eq!(font_size, 10.0);
    }

    #[test]
    fn empty_text_measures_nothing() {
        let metrics = UniformMetrics::default();
        assert!(wrap_lines(&metrics, "", 40.0, 100.0).is_empty());
        assert!(wrap_lines(&metrics, " \n ", 40.0, 100.0).is_empty());
        assert_eq!(measure_height(&metrics, "", 40.0, 100.0, 1.6), 0.0);
    }

    #[test]
    fn degenerate_configurations_terminate() {
        let configuration = FitConfiguration {
            min_font_size: 50.0,
            max_font_size: 20.0,
            grow_step: 0.0,
            shrink_step: -3.0,
            fine_step: 0.0,
            ..Default::default()
        };
        let font_size = fit_font_size_with(|font_size| font_size * 100.0, f32::NAN, 10.0, &configuration);
        assert_eq!(font_size, 20.0);
    }

    #[test]
    fn lines_wrap_at_the_box_width() {
        // Every character advances by 5 pixels at a font size of 10
        let metrics = UniformMetrics::default();
        let lines = wrap_lines(&metrics, "aaa bbb ccc\n\nddd", 10.0, 40.0);

        let texts: Vec<String> = lines.iter().map(TextLine::text).collect();
        similar_asserts::assert_eq!(texts, vec!["aaa bbb", "ccc", "", "ddd"]);
        assert!(!lines[0].ends_paragraph);
        assert!(lines[1].ends_paragraph);
        assert!(lines[2].ends_paragraph);
        assert_eq!(lines[0].natural_width(), 35.0);
    }

    #[test]
    fn words_wider_than_the_box_are_broken() {
        let metrics = UniformMetrics::default();
        let lines = wrap_lines(&metrics, "ab cdefghij kl", 10.0, 20.0);

        let texts: Vec<String> = lines.iter().map(TextLine::text).collect();
        similar_asserts::assert_eq!(texts, vec!["ab", "cdef", "ghij", "kl"]);
    }
}
