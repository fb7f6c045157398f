use super::*;

fn config(chunk_size: usize, chunk_overlap: usize) -> ChunkingConfig {
    ChunkingConfig {
        chunk_size,
        chunk_overlap,
    }
}

fn splitter(chunk_size: usize, chunk_overlap: usize) -> TextSplitter {
    TextSplitter::new(&config(chunk_size, chunk_overlap)).expect("valid chunking config")
}

fn page(content: &str, page: u32) -> Document {
    Document {
        content: content.to_string(),
        source: "test.pdf".to_string(),
        page,
    }
}

#[test]
fn short_text_is_a_single_chunk() {
    let chunks = splitter(1000, 200).split_text("Paris is the capital of France.");

    assert_eq!(chunks, vec!["Paris is the capital of France.".to_string()]);
}

#[test]
fn chunks_overlap_exactly_without_separators() {
    let text = "abcdefghijklmnopqrstuvwxyz";

    let chunks = splitter(10, 3).split_text(text);

    assert_eq!(
        chunks,
        vec!["abcdefghij", "hijklmnopq", "opqrstuvwx", "vwxyz"]
    );
    for pair in chunks.windows(2) {
        let previous: Vec<char> = pair[0].chars().collect();
        let tail: String = previous[previous.len() - 3..].iter().collect();
        assert!(pair[1].starts_with(&tail), "{:?} should start with {:?}", pair[1], tail);
    }
}

#[test]
fn every_chunk_respects_the_size_limit() {
    let text = "Lorem ipsum dolor sit amet, consectetur adipiscing elit.\n\
                Sed do eiusmod tempor incididunt ut labore et dolore magna aliqua.\n\n\
                Ut enim ad minim veniam, quis nostrud exercitation ullamco laboris.\n\
                Duis aute irure dolor in reprehenderit in voluptate velit esse."
        .repeat(5);

    for (size, overlap) in [(40, 10), (80, 20), (120, 0), (15, 14)] {
        let chunks = splitter(size, overlap).split_text(&text);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(
                chunk.chars().count() <= size,
                "chunk of {} chars exceeds {}: {:?}",
                chunk.chars().count(),
                size,
                chunk
            );
        }
    }
}

#[test]
fn paragraphs_are_preferred_boundaries() {
    let text = "Alpha beta gamma.\n\nDelta epsilon zeta.";

    let chunks = splitter(25, 5).split_text(text);

    assert_eq!(chunks, vec!["Alpha beta gamma.", "Delta epsilon zeta."]);
}

#[test]
fn long_lines_fall_back_to_word_boundaries() {
    let text = "one two three four five six seven eight nine ten eleven twelve";
    let words: Vec<&str> = text.split_whitespace().collect();

    let chunks = splitter(20, 5).split_text(text);

    assert!(chunks.len() > 1);
    for chunk in &chunks {
        for word in chunk.split_whitespace() {
            assert!(words.contains(&word), "word {:?} was cut", word);
        }
    }
    assert!(chunks[0].starts_with("one"));
    assert!(chunks[chunks.len() - 1].ends_with("twelve"));
}

#[test]
fn multibyte_text_is_counted_in_characters() {
    let text = "çğıöşü".repeat(10);

    let chunks = splitter(8, 2).split_text(&text);

    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|c| c.chars().count() <= 8));
}

#[test]
fn whitespace_only_text_yields_nothing() {
    assert!(splitter(100, 10).split_text("   \n\n  \n ").is_empty());
    assert!(splitter(100, 10).split_text("").is_empty());
}

#[test]
fn custom_separators() {
    let chunks = splitter(3, 0)
        .with_separators(vec!["|".to_string()])
        .split_text("a|b|c");

    assert_eq!(chunks, vec!["a|b", "|c"]);
}

#[test]
fn invalid_configurations_are_rejected() {
    assert!(matches!(
        TextSplitter::new(&config(0, 0)),
        Err(RagError::Config(_))
    ));
    assert!(matches!(
        TextSplitter::new(&config(100, 100)),
        Err(RagError::Config(_))
    ));
    assert!(matches!(
        TextSplitter::new(&config(100, 150)),
        Err(RagError::Config(_))
    ));
    assert!(TextSplitter::new(&config(100, 99)).is_ok());
}

#[test]
fn documents_keep_their_metadata() {
    let documents = vec![
        page("First page text that is long enough to split apart.", 1),
        page("", 2),
        page("Third page.", 3),
    ];

    let chunks = chunk_documents(&documents, &config(20, 5)).expect("chunking should succeed");

    let first_page: Vec<&Chunk> = chunks.iter().filter(|c| c.page == 1).collect();
    assert!(first_page.len() > 1);
    for (i, chunk) in first_page.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i);
        assert_eq!(chunk.source, "test.pdf");
    }

    assert!(chunks.iter().all(|c| c.page != 2));

    let third_page: Vec<&Chunk> = chunks.iter().filter(|c| c.page == 3).collect();
    assert_eq!(third_page.len(), 1);
    assert_eq!(third_page[0].content, "Third page.");
    assert_eq!(third_page[0].chunk_index, 0);
}

#[test]
fn chunk_documents_rejects_bad_config() {
    let documents = vec![page("text", 1)];

    assert!(chunk_documents(&documents, &config(10, 10)).is_err());
}
