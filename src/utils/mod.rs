/// Removes every whitespace character from a URL, including interior ones.
pub fn sanitize_url(url: &str) -> String {
    url.chars().filter(|c| !c.is_whitespace()).collect()
}
