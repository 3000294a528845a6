mod uri_parsing;
